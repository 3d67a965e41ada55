use crate::prelude::{println, *};
use colored::Colorize;
use redcap_spec_core::adapters::{
    feature_min_version, registry, Adapter, Feature, LATEST_VERSION, MIN_SUPPORTED_VERSION,
    SUPPORTED_VERSIONS,
};
use redcap_spec_core::Version;

#[derive(Debug, clap::Parser)]
#[command(name = "versions")]
#[command(about = "List supported release lines and feature thresholds")]
pub struct App {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct Threshold {
    pub feature: Feature,
    pub introduced: Version,
}

#[derive(Debug, serde::Serialize)]
pub struct VersionsOutput {
    pub min_supported: Version,
    pub latest: Version,
    pub adapters: &'static [Adapter],
    pub thresholds: Vec<Threshold>,
    pub known_releases: &'static [Version],
}

pub fn versions_data() -> VersionsOutput {
    VersionsOutput {
        min_supported: MIN_SUPPORTED_VERSION,
        latest: LATEST_VERSION,
        adapters: registry(),
        thresholds: Feature::ALL
            .into_iter()
            .map(|feature| Threshold {
                feature,
                introduced: feature_min_version(feature),
            })
            .collect(),
        known_releases: SUPPORTED_VERSIONS,
    }
}

pub fn run(app: App, global: crate::Global) -> Result<()> {
    let data = versions_data();

    if app.json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!(
        "{} {} {} {}\n",
        "Supported:".bright_white().bold(),
        data.min_supported.to_string().bright_cyan(),
        "through".bright_white(),
        f!("{}+", data.latest).bright_cyan()
    );

    let mut table = new_table();
    table.add_row(prettytable::row!["Adapter", "Range", "Features"]);
    for adapter in data.adapters {
        table.add_row(prettytable::row![
            adapter.name,
            adapter.range,
            join_or_dash(adapter.features.enabled())
        ]);
    }
    table.printstd();

    if global.verbose {
        println!();
        let mut table = new_table();
        table.add_row(prettytable::row!["Feature", "Introduced"]);
        for threshold in &data.thresholds {
            table.add_row(prettytable::row![threshold.feature, threshold.introduced]);
        }
        table.printstd();

        println!("\nKnown releases: {}", join_or_dash(data.known_releases));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_data() {
        let data = versions_data();
        assert_eq!(data.adapters.len(), 3);
        assert_eq!(data.thresholds.len(), Feature::ALL.len());
        assert_eq!(data.min_supported, Version::new(14, 0, 0));

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["adapters"][1]["name"], "v15");
        assert_eq!(json["latest"], "16.0.8");
    }
}

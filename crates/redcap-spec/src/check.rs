use crate::prelude::{eprintln, println, *};
use colored::Colorize;
use redcap_spec_core::adapters::{is_version_supported, nearest_lower_adapter, select_adapter, Feature};
use redcap_spec_core::catalog::{actions_for_version, content_types_for_adapter, Action, ContentType};
use redcap_spec_core::{Version, VersionRange};

#[derive(Debug, clap::Parser)]
#[command(name = "check")]
#[command(about = "Resolve the adapter and API surface for a REDCap version")]
pub struct App {
    /// REDCap server version, e.g. 15.5.32
    #[arg(value_name = "VERSION", env = "REDCAP_VERSION")]
    version: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct ContentSurface {
    pub content: ContentType,
    pub actions: Vec<Action>,
}

#[derive(Debug, serde::Serialize)]
pub struct CheckOutput {
    pub version: Version,
    pub supported: bool,
    pub adapter: Option<String>,
    pub range: Option<VersionRange>,
    pub features: Vec<Feature>,
    pub content: Vec<ContentSurface>,
    /// Adapter a best-effort generation would fall back to.
    pub nearest_lower: Option<String>,
}

pub fn check_data(version: &str) -> Result<CheckOutput> {
    let version = Version::parse(version)?;

    if !is_version_supported(&version) {
        return Ok(CheckOutput {
            version,
            supported: false,
            adapter: None,
            range: None,
            features: Vec::new(),
            content: Vec::new(),
            nearest_lower: nearest_lower_adapter(&version).map(|a| a.name.to_string()),
        });
    }

    let adapter = select_adapter(&version)?;
    let mut content = Vec::new();
    for content_type in content_types_for_adapter(adapter) {
        content.push(ContentSurface {
            content: content_type,
            actions: actions_for_version(&version, content_type)?.into_iter().collect(),
        });
    }

    Ok(CheckOutput {
        version,
        supported: true,
        adapter: Some(adapter.name.to_string()),
        range: Some(adapter.range),
        features: adapter.features.enabled().collect(),
        content,
        nearest_lower: None,
    })
}

pub fn run(app: App, global: crate::Global) -> Result<()> {
    let data = check_data(&app.version)?;

    if app.json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    let mut table = new_table();
    table.add_row(prettytable::row!["Version", data.version]);
    let supported = if data.supported {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    };
    table.add_row(prettytable::row!["Supported", supported]);
    if let (Some(adapter), Some(range)) = (&data.adapter, &data.range) {
        table.add_row(prettytable::row!["Adapter", f!("{adapter} ({range})")]);
        table.add_row(prettytable::row!["Features", join_or_dash(&data.features)]);
        table.add_row(prettytable::row!["Content types", data.content.len()]);
    }
    if let Some(nearest) = &data.nearest_lower {
        table.add_row(prettytable::row!["Best-effort adapter", nearest]);
    }
    table.printstd();

    if !data.supported {
        eprintln!(
            "\n{}",
            "Use `generate --best-effort` to generate against the nearest lower adapter.".yellow()
        );
        return Ok(());
    }

    if global.verbose {
        println!();
        let mut table = new_table();
        table.add_row(prettytable::row!["Content", "Group", "Actions"]);
        for surface in &data.content {
            table.add_row(prettytable::row![
                surface.content,
                surface.content.tag_group(),
                join_or_dash(&surface.actions)
            ]);
        }
        table.printstd();
    }

    Ok(())
}

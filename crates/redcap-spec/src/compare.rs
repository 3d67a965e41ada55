use std::fs;
use std::path::{Path, PathBuf};

use crate::prelude::{println, *};
use colored::Colorize;
use redcap_spec_core::comparator::{compare_specs, Change, ComparisonResult, ComparisonSummary};
use redcap_spec_core::generator::InterfaceDescription;

#[derive(Debug, clap::Parser)]
#[command(name = "compare")]
#[command(about = "Compare two generated interface descriptions")]
pub struct App {
    /// Baseline description (JSON written by `generate`)
    #[arg(value_name = "FROM")]
    from: PathBuf,

    /// Description to compare against the baseline
    #[arg(value_name = "TO")]
    to: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Load a description written by `generate` without `--openapi`.
pub fn read_description(path: &Path) -> Result<InterfaceDescription> {
    let text =
        fs::read_to_string(path).with_context(|| f!("Failed to read {}", path.display()))?;

    serde_json::from_str(&text).map_err(|e| {
        Error::UnreadableDocument {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

pub fn compare_data(from: &Path, to: &Path) -> Result<ComparisonSummary> {
    let a = read_description(from)?;
    let b = read_description(to)?;
    Ok(compare_specs(&a, &b))
}

pub fn run(app: App, _global: crate::Global) -> Result<()> {
    let summary = compare_data(&app.from, &app.to)?;

    if app.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_summary_text(&summary));
    }

    Ok(())
}

fn format_summary_text(summary: &ComparisonSummary) -> String {
    let mut result = String::new();

    result.push_str(&f!(
        "{} {} {}\n",
        summary.from.bright_white().bold(),
        "->".bright_black(),
        summary.to.bright_white().bold()
    ));
    result.push_str(&f!(
        "{} added, {} removed, {} changed\n",
        summary.counts.added.to_string().green(),
        summary.counts.removed.to_string().red(),
        summary.counts.changed.to_string().yellow()
    ));

    if summary.is_identical() {
        result.push_str(&f!("\n{}\n", "No differences.".green()));
        return result;
    }

    for (title, section) in [
        ("Paths", &summary.paths),
        ("Schemas", &summary.schemas),
        ("Patterns", &summary.patterns),
    ] {
        format_section(&mut result, title, section);
    }

    result
}

fn format_section(result: &mut String, title: &str, section: &ComparisonResult) {
    if section.is_empty() {
        return;
    }

    result.push_str(&f!("\n{}\n", title.bright_cyan().bold()));
    for entry in &section.added {
        let detail = entry.detail.as_deref().unwrap_or_default();
        result.push_str(&f!("  {} {} {}\n", "+".green(), entry.name.green(), detail.bright_black()));
    }
    for entry in &section.removed {
        let detail = entry.detail.as_deref().unwrap_or_default();
        result.push_str(&f!("  {} {} {}\n", "-".red(), entry.name.red(), detail.bright_black()));
    }
    for change in &section.changed {
        format_change(result, change, 1);
    }
}

fn format_change(result: &mut String, change: &Change, depth: usize) {
    let indent = "  ".repeat(depth);
    let line = match (&change.before, &change.after) {
        (None, None) => f!("{} {}", "~".yellow(), change.name.yellow()),
        (None, Some(after)) => f!("{} {}: {}", "+".green(), change.name, after),
        (Some(before), None) => f!("{} {}: {}", "-".red(), change.name, before),
        (Some(before), Some(after)) => f!(
            "{} {}: {} {} {}",
            "~".yellow(),
            change.name,
            before.red(),
            "->".bright_black(),
            after.green()
        ),
    };
    result.push_str(&f!("{indent}{line}\n"));

    for detail in &change.details {
        format_change(result, detail, depth + 1);
    }
}

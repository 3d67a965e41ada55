use std::fs;
use std::path::{Path, PathBuf};

use crate::prelude::{eprintln, println, *};
use colored::Colorize;
use redcap_spec_core::generator::{
    generate_openapi_spec, render_openapi, GenerationOptions, GenerationOutput,
};
use redcap_spec_core::parsers::{extract_sources, ParseWarning, SourceUnit};

/// File extensions handed to the extractors.
pub const SOURCE_EXTENSIONS: [&str; 4] = ["php", "txt", "md", "sh"];

#[derive(Debug, clap::Parser)]
#[command(name = "generate")]
#[command(about = "Generate an interface description from upstream REDCap source files")]
pub struct App {
    /// REDCap server version to generate for, e.g. 15.5.32
    #[arg(long, env = "REDCAP_VERSION")]
    redcap_version: String,

    /// Root of the upstream REDCap source tree
    #[arg(long, env = "REDCAP_SOURCE_DIR")]
    source: PathBuf,

    /// Attach parsed curl examples to their operations
    #[arg(long)]
    include_examples: bool,

    /// Fall back to the nearest lower adapter for unsupported versions
    #[arg(long)]
    best_effort: bool,

    /// Write OpenAPI 3.0 JSON instead of the native description
    #[arg(long)]
    openapi: bool,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct GenerateData {
    pub files: usize,
    pub parse_warnings: Vec<ParseWarning>,
    pub output: GenerationOutput,
}

/// Read every source file under `root`, skipping ignored and hidden entries.
/// Units come back sorted by their `/`-separated relative path.
pub fn read_sources(root: &Path) -> Result<Vec<SourceUnit>> {
    if !root.is_dir() {
        return Err(Error::MissingSourceDir(root.display().to_string()).into());
    }

    let mut units = Vec::new();
    for entry in ignore::WalkBuilder::new(root).build() {
        let entry = entry.context("Failed to walk the source directory")?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !SOURCE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()) {
            continue;
        }

        let bytes = fs::read(path).with_context(|| f!("Failed to read {}", path.display()))?;
        let relative = path.strip_prefix(root).unwrap_or(path);
        log::debug!("read {} ({} bytes)", relative.display(), bytes.len());

        units.push(SourceUnit::new(
            relative.to_string_lossy(),
            String::from_utf8_lossy(&bytes),
        ));
    }

    if units.is_empty() {
        return Err(Error::NoSources(root.display().to_string()).into());
    }

    units.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(units)
}

pub fn generate_data(
    source: &Path,
    version: &str,
    options: &GenerationOptions,
) -> Result<GenerateData> {
    let units = read_sources(source)?;
    let extraction = extract_sources(&units);

    for warning in &extraction.warnings {
        log::warn!("{warning}");
    }

    let output = generate_openapi_spec(version, &extraction.records, options)
        .with_context(|| f!("Failed to generate a description for REDCap {version}"))?;

    for warning in &output.warnings {
        log::warn!("{warning}");
    }

    Ok(GenerateData {
        files: units.len(),
        parse_warnings: extraction.warnings,
        output,
    })
}

pub fn run(app: App, global: crate::Global) -> Result<()> {
    let options = GenerationOptions {
        include_examples: app.include_examples,
        best_effort_version: app.best_effort,
    };
    let data = generate_data(&app.source, &app.redcap_version, &options)?;
    let description = &data.output.description;

    let json = if app.openapi {
        serde_json::to_string_pretty(&render_openapi(description))?
    } else {
        description.to_json()?
    };

    match &app.output {
        Some(path) => {
            fs::write(path, json).with_context(|| f!("Failed to write {}", path.display()))?;
            log::info!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }

    if global.verbose || app.output.is_some() {
        eprintln!(
            "{} {} operations for REDCap {} (adapter {}) from {} files",
            "Generated".green().bold(),
            description.paths.len(),
            description.info.server_version,
            description.info.adapter,
            data.files
        );
        let warnings = data.parse_warnings.len() + data.output.warnings.len();
        if warnings > 0 {
            eprintln!(
                "{}",
                f!("{warnings} warnings (RUST_LOG=warn to list them)").yellow()
            );
        }
    }

    Ok(())
}

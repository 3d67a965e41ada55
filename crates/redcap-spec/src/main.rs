use crate::prelude::*;
use clap::Parser;

mod check;
mod compare;
mod error;
mod generate;
mod prelude;
mod versions;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Model the REDCap API surface per server version: resolve adapters, extract the surface from upstream source files, generate descriptions and diff them"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Whether to display additional information.
    #[clap(long, env = "REDCAP_SPEC_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// List supported release lines and feature thresholds
    Versions(crate::versions::App),

    /// Resolve the adapter and API surface for a REDCap version
    Check(crate::check::App),

    /// Generate an interface description from upstream REDCap source files
    Generate(crate::generate::App),

    /// Compare two generated interface descriptions
    Compare(crate::compare::App),
}

fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Versions(sub_app) => crate::versions::run(sub_app, app.global),
        SubCommands::Check(sub_app) => crate::check::run(sub_app, app.global),
        SubCommands::Generate(sub_app) => crate::generate::run(sub_app, app.global),
        SubCommands::Compare(sub_app) => crate::compare::run(sub_app, app.global),
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}

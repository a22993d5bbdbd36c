//! CLI argument parsing for the analysis pipeline.
//!
//! Each subcommand stands in for one of the project's build targets; the
//! `about` text on every command is what `tims help` prints.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "tims",
    version,
    about = "Reproducible pipeline for the TIMS fatal-crash analysis",
    after_help = "Examples:\n  tims env\n  tims all\n  tims html\n  tims status --json\n  tims prepare --decode",
    disable_help_subcommand = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Project root containing tims.json, the manifest, and the notebooks
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    pub project: PathBuf,

    /// Log debug detail (TIMS_LOG overrides)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Clean(CleanArgs),
    Env(EnvArgs),
    Html(HtmlArgs),
    All(AllArgs),
    Test(TestArgs),
    Help(HelpArgs),
    Status(StatusArgs),
    Prepare(PrepareArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Remove generated artifacts and uninstall the package")]
pub struct CleanArgs {
    /// Leave the installed package in place
    #[arg(long)]
    pub keep_package: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Create or update the environment from the manifest")]
pub struct EnvArgs {
    /// Re-apply the manifest even when it is unchanged
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Build the static HTML report from executed notebooks")]
pub struct HtmlArgs {}

#[derive(Parser, Debug)]
#[command(about = "Install the package and execute every notebook")]
pub struct AllArgs {
    /// Execute notebooks even when their inputs are unchanged
    #[arg(long)]
    pub rerun_all: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Install the package and run the test suite")]
pub struct TestArgs {}

#[derive(Parser, Debug)]
#[command(about = "Show a summary of all commands")]
pub struct HelpArgs {}

#[derive(Parser, Debug)]
#[command(about = "Report which artifacts are fresh, stale, or failed")]
pub struct StatusArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Clean raw TIMS tables into analysis-ready CSV files")]
pub struct PrepareArgs {
    /// Directory holding Crashes.csv, Parties.csv, and Victims.csv
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output directory (defaults to <build_dir>/clean)
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Add *_DESC columns decoded from the SWITRS codebooks
    #[arg(long)]
    pub decode: bool,

    /// Keep crashes that have no usable coordinates
    #[arg(long)]
    pub keep_missing_location: bool,
}

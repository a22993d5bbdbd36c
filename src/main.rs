use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod cli;
mod config;
mod data;
mod error;
mod graph;
mod manifest;
mod notebook;
mod project;
mod runner;
mod staging;
mod state;
mod util;
mod workflow;

use cli::{Command, RootArgs};
use runner::SystemRunner;
use workflow::PipelineContext;

const LOG_ENV: &str = "TIMS_LOG";

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry().with(stderr_layer).init();
}

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", util::error_chain_message(&err));
            let code = error::exit_code_for(&err);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(args: RootArgs) -> Result<()> {
    let runner = SystemRunner;
    let load = || PipelineContext::load(&args.project, &runner);
    match args.command {
        Command::Help(_) => print!("{}", workflow::render_help()),
        Command::Clean(clean) => {
            workflow::run_clean(&load()?, clean.keep_package)?;
        }
        Command::Env(env) => {
            let outcome = workflow::run_env(&load()?, env.force)?;
            tracing::info!(outcome = ?outcome, "env complete");
        }
        Command::Html(_) => {
            let ctx = load()?;
            let output = workflow::build_report(&ctx)?;
            println!("{}", util::display_path(&output, Some(ctx.paths.root())));
        }
        Command::All(all) => {
            workflow::run_all(&load()?, all.rerun_all)?;
        }
        Command::Test(_) => workflow::run_tests(&load()?)?,
        Command::Status(status) => {
            let summary = workflow::status_summary(&load()?)?;
            print!("{}", workflow::render_status(&summary, status.json)?);
        }
        Command::Prepare(prepare) => {
            let ctx = load()?;
            let options = workflow::PrepareOptions {
                data_dir: prepare.data_dir,
                out: prepare.out,
                decode: prepare.decode,
                keep_missing_location: prepare.keep_missing_location,
            };
            let summary = workflow::run_prepare(&ctx.paths, &options)?;
            println!(
                "{}",
                util::display_path(&summary.out_dir, Some(ctx.paths.root()))
            );
        }
    }
    Ok(())
}

use super::install::install_package;
use super::{ensure_success, PipelineContext};
use crate::error::StepFailure;
use crate::runner::Tool;
use anyhow::{Context, Result};

/// `tims test`: install the package, then run the whole test suite.
pub fn run_tests(ctx: &PipelineContext<'_>) -> Result<()> {
    install_package(ctx)?;
    let invocation = ctx
        .tools()
        .command(Tool::Pytest, ctx.paths.config().test_args.iter())?;
    tracing::info!(command = %invocation.command_line(), "running tests");
    let outcome = ctx.runner.run(&invocation).context("run tests")?;
    ensure_success(&invocation, &outcome, |detail, exit_code| {
        StepFailure::TestFailure { detail, exit_code }
    })?;
    tracing::info!(elapsed_ms = outcome.elapsed_ms, "tests passed");
    Ok(())
}

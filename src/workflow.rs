//! Pipeline steps, one module per command.
//!
//! Steps share a `PipelineContext` (project layout plus tool runner) and fail
//! fast: the first unsuccessful tool run becomes a `StepFailure` and nothing
//! after it runs.
mod clean;
mod context;
mod env;
mod execute;
mod help;
mod install;
mod prepare;
mod report;
mod status;
mod test_suite;

#[cfg(test)]
mod test_support;

pub use clean::run_clean;
pub use context::PipelineContext;
pub use env::run_env;
pub use execute::run_all;
pub use help::render_help;
pub use prepare::{run_prepare, PrepareOptions};
pub use report::build_report;
pub use status::{render_status, status_summary};
pub use test_suite::run_tests;

use crate::error::StepFailure;
use crate::runner::{Invocation, RunOutcome};

/// Turn an unsuccessful tool run into the step's typed failure.
fn ensure_success(
    invocation: &Invocation,
    outcome: &RunOutcome,
    failure: impl FnOnce(String, Option<i32>) -> StepFailure,
) -> Result<(), StepFailure> {
    if outcome.success {
        return Ok(());
    }
    Err(failure(
        format!(
            "`{}` failed with {}",
            invocation.command_line(),
            outcome.status_string()
        ),
        outcome.exit_code,
    ))
}

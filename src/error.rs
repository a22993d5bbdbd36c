//! Failure taxonomy for pipeline steps.
//!
//! Every step is fail-fast: the first failure is wrapped in a `StepFailure`,
//! travels up through `anyhow` context, and `main` turns it into the process
//! exit status.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepFailure {
    #[error("environment provisioning failed: {detail}")]
    Dependency {
        detail: String,
        exit_code: Option<i32>,
    },
    #[error("package install failed: {detail}")]
    Packaging {
        detail: String,
        exit_code: Option<i32>,
    },
    #[error("notebook {notebook} failed: {detail}")]
    CellExecution {
        notebook: String,
        detail: String,
        exit_code: Option<i32>,
    },
    #[error("report build failed: {detail}")]
    ReportBuild {
        detail: String,
        exit_code: Option<i32>,
    },
    #[error("test suite failed: {detail}")]
    TestFailure {
        detail: String,
        exit_code: Option<i32>,
    },
    #[error("cleanup failed: {detail}")]
    Cleanup {
        detail: String,
        exit_code: Option<i32>,
    },
}

impl StepFailure {
    /// Exit status for the process: the failing tool's own code when known.
    pub fn exit_code(&self) -> i32 {
        let code = match self {
            StepFailure::Dependency { exit_code, .. }
            | StepFailure::Packaging { exit_code, .. }
            | StepFailure::CellExecution { exit_code, .. }
            | StepFailure::ReportBuild { exit_code, .. }
            | StepFailure::TestFailure { exit_code, .. }
            | StepFailure::Cleanup { exit_code, .. } => *exit_code,
        };
        match code {
            Some(code) if code != 0 => code,
            _ => 1,
        }
    }
}

/// Exit status for an arbitrary pipeline error.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<StepFailure>())
        .map(StepFailure::exit_code)
        .unwrap_or(1)
}

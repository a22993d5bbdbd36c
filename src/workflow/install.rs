use super::{ensure_success, PipelineContext};
use crate::error::StepFailure;
use crate::runner::Tool;
use anyhow::{Context, Result};

/// Install the project package in editable mode so notebooks and tests
/// import the working tree directly.
pub fn install_package(ctx: &PipelineContext<'_>) -> Result<()> {
    let package = &ctx.paths.config().package;
    let package_dir = ctx.paths.package_dir();
    if !package_dir.is_dir() {
        return Err(StepFailure::Packaging {
            detail: format!("package directory {} does not exist", package_dir.display()),
            exit_code: None,
        }
        .into());
    }
    let invocation = ctx
        .tools()
        .command(Tool::Pip, ["install", "-e", package.dir.as_str()])?;
    tracing::info!(package = %package.name, "installing package (editable)");
    let outcome = ctx.runner.run(&invocation).context("install package")?;
    ensure_success(&invocation, &outcome, |detail, exit_code| {
        StepFailure::Packaging { detail, exit_code }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::{failed, FakeRunner};
    use crate::workflow::test_support::{test_config, TestProject};

    #[test]
    fn installs_package_dir_in_editable_mode() {
        let project = TestProject::new(test_config());
        let runner = FakeRunner::succeeding();
        let ctx = project.context(&runner);
        install_package(&ctx).expect("install");
        assert_eq!(runner.command_lines(), vec!["python -m pip install -e ."]);
        assert_eq!(runner.calls()[0].cwd, project.root());
    }

    #[test]
    fn build_errors_surface_as_packaging_failures() {
        let project = TestProject::new(test_config());
        let runner = FakeRunner::new(|_| Ok(failed(2)));
        let ctx = project.context(&runner);
        let err = install_package(&ctx).expect_err("pip failure");
        let failure = err.downcast_ref::<StepFailure>().expect("typed failure");
        assert!(matches!(failure, StepFailure::Packaging { .. }));
        assert_eq!(failure.exit_code(), 2);
    }

    #[test]
    fn missing_package_dir_is_reported() {
        let mut config = test_config();
        config.package.dir = "pkg".to_string();
        let project = TestProject::new(config);
        let runner = FakeRunner::succeeding();
        let ctx = project.context(&runner);
        let err = install_package(&ctx).expect_err("missing dir");
        assert!(err.to_string().contains("does not exist"));
        assert!(runner.calls().is_empty());
    }
}

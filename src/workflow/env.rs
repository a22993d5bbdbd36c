//! Environment provisioning step.
//!
//! Creates the named conda environment when it is absent and otherwise
//! updates it in place with `--prune`. The manifest hash recorded in build
//! state makes a repeat run with an unchanged manifest a no-op.
use super::{ensure_success, PipelineContext};
use crate::error::StepFailure;
use crate::manifest::{diff_dependencies, load_manifest};
use crate::runner::Tool;
use crate::state::{load_state, write_state, EnvironmentRecord};
use crate::util::{error_chain_message, now_epoch_ms};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvOutcome {
    UpToDate,
    Created,
    Updated,
}

#[derive(Debug, Deserialize)]
struct CondaEnvList {
    #[serde(default)]
    envs: Vec<String>,
}

pub fn run_env(ctx: &PipelineContext<'_>, force: bool) -> Result<EnvOutcome> {
    let paths = &ctx.paths;
    let config = paths.config();
    let manifest = load_manifest(&paths.manifest_path()).map_err(|err| StepFailure::Dependency {
        detail: error_chain_message(&err),
        exit_code: None,
    })?;
    if let Some(name) = manifest.name.as_deref() {
        if name != config.env_name {
            tracing::warn!(
                manifest_name = name,
                env_name = %config.env_name,
                "manifest name differs from env_name; using env_name"
            );
        }
    }

    let mut state = load_state(paths)?;
    let exists = environment_exists(ctx)?;
    let recorded = state
        .environment
        .as_ref()
        .filter(|record| record.env_name == config.env_name);

    if !force && exists && recorded.is_some_and(|record| record.manifest_hash == manifest.hash) {
        tracing::info!(env = %config.env_name, "environment up to date");
        return Ok(EnvOutcome::UpToDate);
    }

    let current = manifest.rendered_dependencies();
    if let Some(record) = recorded {
        let changes = diff_dependencies(&record.dependencies, &current);
        if changes.is_empty() {
            tracing::info!("manifest changed without dependency changes");
        }
        for dep in &changes.added {
            tracing::info!(dependency = %dep, "adding");
        }
        for (from, to) in &changes.changed {
            tracing::info!(from = %from, to = %to, "changing");
        }
        for dep in &changes.removed {
            tracing::info!(dependency = %dep, "pruning");
        }
    }

    let env_name = config.env_name.as_str();
    let manifest_arg = config.manifest.as_str();
    let (args, outcome_kind) = if exists {
        (
            vec![
                "env", "update", "--name", env_name, "--file", manifest_arg, "--prune",
            ],
            EnvOutcome::Updated,
        )
    } else {
        (
            vec!["env", "create", "--name", env_name, "--file", manifest_arg],
            EnvOutcome::Created,
        )
    };
    let invocation = ctx.tools().command(Tool::Conda, args)?;
    tracing::info!(
        command = %invocation.command_line(),
        channels = %manifest.channels.join(", "),
        "provisioning environment"
    );
    let outcome = ctx
        .runner
        .run(&invocation)
        .context("provision environment")?;
    ensure_success(&invocation, &outcome, |detail, exit_code| {
        StepFailure::Dependency { detail, exit_code }
    })?;

    state.environment = Some(EnvironmentRecord {
        env_name: config.env_name.clone(),
        manifest_hash: manifest.hash,
        dependencies: current,
        applied_at_epoch_ms: now_epoch_ms()?,
    });
    write_state(paths, &state)?;
    Ok(outcome_kind)
}

fn environment_exists(ctx: &PipelineContext<'_>) -> Result<bool> {
    let invocation = ctx
        .tools()
        .command(Tool::Conda, ["env", "list", "--json"])?
        .captured();
    let outcome = ctx
        .runner
        .run(&invocation)
        .context("list conda environments")?;
    ensure_success(&invocation, &outcome, |detail, exit_code| {
        StepFailure::Dependency { detail, exit_code }
    })?;
    let listing: CondaEnvList = serde_json::from_str(&outcome.stdout).map_err(|err| {
        StepFailure::Dependency {
            detail: format!("parse conda env list: {err}"),
            exit_code: None,
        }
    })?;
    let env_name = ctx.paths.config().env_name.as_str();
    Ok(listing
        .envs
        .iter()
        .any(|prefix| Path::new(prefix).file_name().and_then(|name| name.to_str()) == Some(env_name)))
}

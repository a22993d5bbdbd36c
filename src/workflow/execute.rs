//! Notebook execution step.
//!
//! Each notebook runs in a fresh kernel via `jupyter nbconvert --execute`,
//! in declared dependency order. Output lands in a staging area first and is
//! only published once it parses and carries no error outputs, so a failing
//! cell never clobbers the authored notebook or the last good output.
use super::install::install_package;
use super::{ensure_success, PipelineContext};
use crate::config::{ExecutionMode, NotebookSpec, PipelineConfig};
use crate::error::StepFailure;
use crate::graph::{execution_order, notebook_set};
use crate::notebook::NotebookDocument;
use crate::project::ProjectPaths;
use crate::runner::Tool;
use crate::staging::StagingArea;
use crate::state::{
    combine_hashes, hash_paths, load_state, write_state, BuildState, NotebookRecord, RunStatus,
};
use crate::util::{error_chain_message, now_epoch_ms, truncate_string};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const MAX_FAILURE_BYTES: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
    Failed,
    NeverRun,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Failed => "failed",
            Freshness::NeverRun => "never run",
        }
    }
}

/// A notebook with its current key and how it relates to the last run.
#[derive(Debug, Clone)]
pub struct NotebookPlan {
    pub spec: NotebookSpec,
    pub key: String,
    pub output: String,
    pub freshness: Freshness,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Project-relative path the executed notebook is published to.
pub fn output_rel_path(config: &PipelineConfig, notebook: &str) -> String {
    match config.execution.mode {
        ExecutionMode::InPlace => notebook.to_string(),
        ExecutionMode::Separate => format!(
            "{}/{}",
            config.execution.executed_dir.trim_end_matches('/'),
            notebook
        ),
    }
}

/// Compute keys and freshness for every notebook, in execution order.
pub fn plan_notebooks(paths: &ProjectPaths, state: &BuildState) -> Result<Vec<NotebookPlan>> {
    let ordered = execution_order(&notebook_set(paths)?)?;
    if ordered.is_empty() {
        return Ok(Vec::new());
    }
    let root = paths.root();
    let manifest_hash = hash_paths(root, &[paths.manifest_path()])?;
    let package_hash = hash_paths(root, &paths.package_source_dirs())?;
    let artifacts_hash = hash_paths(root, &paths.artifact_dirs())?;
    let artifacts_intact = state.artifacts_hash.as_deref() == Some(artifacts_hash.as_str());

    let mut keys: BTreeMap<String, String> = BTreeMap::new();
    let mut plans = Vec::with_capacity(ordered.len());
    for spec in ordered {
        let document = NotebookDocument::load(&paths.join(&spec.path))
            .with_context(|| format!("notebook {}", spec.path))?;
        // notebooks without declared inputs read the raw data directory
        let inputs = if spec.inputs.is_empty() {
            vec![paths.data_dir()]
        } else {
            spec.inputs.iter().map(|rel| paths.join(rel)).collect()
        };
        let inputs_hash = hash_paths(root, &inputs)?;
        let digest = document.source_digest();

        let mut parts: Vec<(String, String)> = vec![
            ("manifest".to_string(), manifest_hash.clone()),
            ("package".to_string(), package_hash.clone()),
            ("notebook".to_string(), digest),
            ("inputs".to_string(), inputs_hash),
        ];
        for dep in &spec.depends_on {
            let upstream = keys
                .get(dep)
                .ok_or_else(|| anyhow!("notebook {} planned before {}", dep, spec.path))?;
            parts.push((format!("upstream:{dep}"), upstream.clone()));
        }
        let borrowed = parts
            .iter()
            .map(|(label, value)| (label.as_str(), value.as_str()))
            .collect::<Vec<_>>();
        let key = combine_hashes(&borrowed);
        keys.insert(spec.path.clone(), key.clone());

        let output = output_rel_path(paths.config(), &spec.path);
        let freshness = match state.notebooks.get(&spec.path) {
            None => Freshness::NeverRun,
            Some(record) if record.status == RunStatus::Failed => Freshness::Failed,
            Some(record) => {
                if record.inputs_hash == key
                    && artifacts_intact
                    && record.output == output
                    && paths.join(&record.output).is_file()
                {
                    Freshness::Fresh
                } else {
                    Freshness::Stale
                }
            }
        };
        plans.push(NotebookPlan {
            spec,
            key,
            output,
            freshness,
        });
    }
    Ok(plans)
}

/// `tims all`: install the package, then execute every notebook that is not
/// already current.
pub fn run_all(ctx: &PipelineContext<'_>, rerun_all: bool) -> Result<ExecutionSummary> {
    install_package(ctx)?;
    execute_notebooks(ctx, rerun_all)
}

pub fn execute_notebooks(ctx: &PipelineContext<'_>, rerun_all: bool) -> Result<ExecutionSummary> {
    let paths = &ctx.paths;
    let mut state = load_state(paths)?;
    let plans = plan_notebooks(paths, &state)?;
    if plans.is_empty() {
        tracing::warn!("no notebooks to execute");
        return Ok(ExecutionSummary::default());
    }

    let mut summary = ExecutionSummary::default();
    for plan in plans {
        if plan.freshness == Freshness::Fresh && !rerun_all {
            tracing::debug!(notebook = %plan.spec.path, "notebook up to date");
            summary.skipped.push(plan.spec.path);
            continue;
        }
        tracing::info!(notebook = %plan.spec.path, output = %plan.output, "executing notebook");
        let result = execute_one(ctx, &plan);
        let record = NotebookRecord {
            inputs_hash: plan.key.clone(),
            status: if result.is_ok() {
                RunStatus::Succeeded
            } else {
                RunStatus::Failed
            },
            output: plan.output.clone(),
            finished_at_epoch_ms: now_epoch_ms()?,
            failure: result
                .as_ref()
                .err()
                .map(|err| truncate_string(&error_chain_message(err), MAX_FAILURE_BYTES)),
        };
        state.notebooks.insert(plan.spec.path.clone(), record);
        state.artifacts_hash = Some(hash_paths(paths.root(), &paths.artifact_dirs())?);
        write_state(paths, &state)?;
        result?;
        summary.executed.push(plan.spec.path);
    }
    tracing::info!(
        executed = summary.executed.len(),
        skipped = summary.skipped.len(),
        "notebooks complete"
    );
    Ok(summary)
}

fn execute_one(ctx: &PipelineContext<'_>, plan: &NotebookPlan) -> Result<()> {
    let paths = &ctx.paths;
    let notebook = plan.spec.path.as_str();
    let staging = StagingArea::create(&paths.state_dir(), "exec-")?;
    let staged = staging.path_for(&plan.output);
    let staged_dir = staged
        .parent()
        .ok_or_else(|| anyhow!("staged output {} has no parent", staged.display()))?;
    let stem = Path::new(&plan.output)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| anyhow!("invalid notebook file name {}", plan.output))?;
    std::fs::create_dir_all(staged_dir)
        .with_context(|| format!("create {}", staged_dir.display()))?;

    let timeout = format!(
        "--ExecutePreprocessor.timeout={}",
        paths.config().execution.timeout_seconds
    );
    let staged_dir_arg = staged_dir.display().to_string();
    let invocation = ctx.tools().command(
        Tool::Jupyter,
        [
            "nbconvert",
            "--to",
            "notebook",
            "--execute",
            notebook,
            "--output",
            stem,
            "--output-dir",
            staged_dir_arg.as_str(),
            timeout.as_str(),
        ],
    )?;
    let outcome = ctx
        .runner
        .run(&invocation)
        .with_context(|| format!("execute {notebook}"))?;
    ensure_success(&invocation, &outcome, |detail, exit_code| {
        StepFailure::CellExecution {
            notebook: notebook.to_string(),
            detail,
            exit_code,
        }
    })?;

    if !staged.is_file() {
        return Err(StepFailure::CellExecution {
            notebook: notebook.to_string(),
            detail: "executor reported success but wrote no output".to_string(),
            exit_code: None,
        }
        .into());
    }
    let executed = NotebookDocument::load(&staged).map_err(|err| StepFailure::CellExecution {
        notebook: notebook.to_string(),
        detail: error_chain_message(&err),
        exit_code: None,
    })?;
    if let Some(first) = executed.errors().first() {
        return Err(StepFailure::CellExecution {
            notebook: notebook.to_string(),
            detail: first.to_string(),
            exit_code: None,
        }
        .into());
    }

    staging
        .publish(&plan.output, paths.root())
        .with_context(|| format!("publish executed {notebook}"))?;
    tracing::info!(
        notebook,
        cells = executed.cell_count(),
        code_cells = executed.code_cell_count(),
        elapsed_ms = outcome.elapsed_ms,
        "notebook executed"
    );
    Ok(())
}

//! Report build step.
//!
//! Validates the MyST table of contents and the recorded notebook outcomes
//! before handing the site to the renderer, so a report is never produced
//! from a notebook whose last execution failed.
use super::execute::{plan_notebooks, Freshness, NotebookPlan};
use super::{ensure_success, PipelineContext};
use crate::error::StepFailure;
use crate::project::ProjectPaths;
use crate::runner::Tool;
use crate::state::{combine_hashes, hash_paths, load_state, write_state, ReportRecord};
use crate::util::{error_chain_message, now_epoch_ms};
use anyhow::{anyhow, Context, Result};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn report_failure(detail: impl Into<String>) -> StepFailure {
    StepFailure::ReportBuild {
        detail: detail.into(),
        exit_code: None,
    }
}

/// `file:` entries of `project.toc`, depth first, in document order.
pub fn toc_files(config_text: &str) -> Result<Vec<String>> {
    let doc: Value = serde_yaml::from_str(config_text).context("parse report config YAML")?;
    let mut files = Vec::new();
    if let Some(toc) = doc.get("project").and_then(|project| project.get("toc")) {
        collect_toc(toc, &mut files)?;
    }
    Ok(files)
}

fn collect_toc(node: &Value, files: &mut Vec<String>) -> Result<()> {
    let entries = node
        .as_sequence()
        .ok_or_else(|| anyhow!("toc entries must be a list"))?;
    for entry in entries {
        if let Some(file) = entry.get("file") {
            let file = file
                .as_str()
                .ok_or_else(|| anyhow!("toc `file` must be a string"))?;
            files.push(file.to_string());
        }
        if let Some(children) = entry.get("children") {
            collect_toc(children, files)?;
        }
    }
    Ok(())
}

fn report_root(paths: &ProjectPaths) -> PathBuf {
    let config = paths.report_config_path();
    config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths.root().to_path_buf())
}

/// Key over the report config, its toc files, and every notebook key.
pub fn report_key(paths: &ProjectPaths, plans: &[NotebookPlan]) -> Result<String> {
    let config_path = paths.report_config_path();
    let mut sources = vec![config_path.clone()];
    if config_path.is_file() {
        let text = fs::read_to_string(&config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        let root = report_root(paths);
        sources.extend(toc_files(&text)?.iter().map(|file| root.join(file)));
    }
    let sources_hash = hash_paths(paths.root(), &sources)?;
    let labels = plans
        .iter()
        .map(|plan| (format!("notebook:{}", plan.spec.path), plan.key.clone()))
        .collect::<Vec<_>>();
    let mut parts = vec![("sources", sources_hash.as_str())];
    parts.extend(
        labels
            .iter()
            .map(|(label, key)| (label.as_str(), key.as_str())),
    );
    Ok(combine_hashes(&parts))
}

/// `tims html`: build the static site from the executed notebooks.
pub fn build_report(ctx: &PipelineContext<'_>) -> Result<PathBuf> {
    let paths = &ctx.paths;
    let config_path = paths.report_config_path();
    if !config_path.is_file() {
        return Err(report_failure(format!(
            "report config {} not found",
            config_path.display()
        ))
        .into());
    }
    let text = fs::read_to_string(&config_path)
        .with_context(|| format!("read {}", config_path.display()))?;
    let files = toc_files(&text).map_err(|err| report_failure(error_chain_message(&err)))?;
    let root = report_root(paths);
    let missing = files
        .iter()
        .filter(|file| !root.join(file).is_file())
        .cloned()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(report_failure(format!(
            "table of contents references missing files: {}",
            missing.join(", ")
        ))
        .into());
    }

    let mut state = load_state(paths)?;
    let plans =
        plan_notebooks(paths, &state).map_err(|err| report_failure(error_chain_message(&err)))?;
    let failed = plans
        .iter()
        .filter(|plan| plan.freshness == Freshness::Failed)
        .map(|plan| plan.spec.path.as_str())
        .collect::<Vec<_>>();
    if !failed.is_empty() {
        return Err(report_failure(format!(
            "notebooks failed their last execution: {} (rerun `tims all`)",
            failed.join(", ")
        ))
        .into());
    }
    for plan in &plans {
        match plan.freshness {
            Freshness::Stale => {
                tracing::warn!(notebook = %plan.spec.path, "notebook outputs are stale")
            }
            Freshness::NeverRun => {
                tracing::warn!(notebook = %plan.spec.path, "notebook has never been executed")
            }
            Freshness::Fresh | Freshness::Failed => {}
        }
    }

    let mut invocation = ctx
        .tools()
        .command(Tool::Myst, paths.config().report.build_args.iter())?;
    invocation.cwd = root;
    tracing::info!(command = %invocation.command_line(), "building report");
    let outcome = ctx.runner.run(&invocation).context("build report")?;
    ensure_success(&invocation, &outcome, |detail, exit_code| {
        StepFailure::ReportBuild { detail, exit_code }
    })?;

    let output_dir = paths.report_output_dir();
    if !output_dir.is_dir() {
        return Err(report_failure(format!(
            "renderer produced no output at {}",
            output_dir.display()
        ))
        .into());
    }
    state.report = Some(ReportRecord {
        inputs_hash: report_key(paths, &plans)?,
        built_at_epoch_ms: now_epoch_ms()?,
    });
    write_state(paths, &state)?;
    tracing::info!(
        output = %output_dir.display(),
        elapsed_ms = outcome.elapsed_ms,
        "report complete"
    );
    Ok(output_dir)
}

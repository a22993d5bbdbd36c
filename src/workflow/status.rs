//! Read-only freshness report.
//!
//! Compares current input hashes against build state without invoking any
//! external tool, and suggests the next command to run.
use super::execute::{plan_notebooks, Freshness};
use super::report::report_key;
use super::PipelineContext;
use crate::manifest::load_manifest;
use crate::state::load_state;
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentState {
    ManifestMissing,
    ManifestInvalid,
    NotProvisioned,
    Stale,
    UpToDate,
}

impl EnvironmentState {
    fn as_str(&self) -> &'static str {
        match self {
            EnvironmentState::ManifestMissing => "manifest missing",
            EnvironmentState::ManifestInvalid => "manifest invalid",
            EnvironmentState::NotProvisioned => "not provisioned",
            EnvironmentState::Stale => "stale",
            EnvironmentState::UpToDate => "up to date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    Built,
    Stale,
    NeverBuilt,
}

impl ReportState {
    fn as_str(&self) -> &'static str {
        match self {
            ReportState::Built => "built",
            ReportState::Stale => "stale",
            ReportState::NeverBuilt => "never built",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotebookStatus {
    pub path: String,
    pub state: Freshness,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub env_name: String,
    pub environment: EnvironmentState,
    pub notebooks: Vec<NotebookStatus>,
    pub report: ReportState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
}

pub fn status_summary(ctx: &PipelineContext<'_>) -> Result<StatusSummary> {
    let paths = &ctx.paths;
    let config = paths.config();
    let state = load_state(paths)?;

    let manifest_path = paths.manifest_path();
    let environment = if !manifest_path.is_file() {
        EnvironmentState::ManifestMissing
    } else {
        match load_manifest(&manifest_path) {
            Err(err) => {
                tracing::debug!(error = %err, "manifest does not parse");
                EnvironmentState::ManifestInvalid
            }
            Ok(manifest) => match state
                .environment
                .as_ref()
                .filter(|record| record.env_name == config.env_name)
            {
                None => EnvironmentState::NotProvisioned,
                Some(record) if record.manifest_hash == manifest.hash => {
                    EnvironmentState::UpToDate
                }
                Some(_) => EnvironmentState::Stale,
            },
        }
    };

    let plans = plan_notebooks(paths, &state).context("evaluate notebooks")?;
    let report = match state.report.as_ref() {
        None => ReportState::NeverBuilt,
        Some(record) => {
            if paths.report_output_dir().is_dir()
                && record.inputs_hash == report_key(paths, &plans)?
            {
                ReportState::Built
            } else {
                ReportState::Stale
            }
        }
    };
    let notebooks = plans
        .into_iter()
        .map(|plan| NotebookStatus {
            failure: state
                .notebooks
                .get(&plan.spec.path)
                .and_then(|record| record.failure.clone()),
            path: plan.spec.path,
            state: plan.freshness,
            output: plan.output,
        })
        .collect::<Vec<_>>();

    let next_action = if environment != EnvironmentState::UpToDate {
        Some("tims env".to_string())
    } else if notebooks.iter().any(|nb| nb.state != Freshness::Fresh) {
        Some("tims all".to_string())
    } else if report != ReportState::Built {
        Some("tims html".to_string())
    } else {
        None
    };

    Ok(StatusSummary {
        env_name: config.env_name.clone(),
        environment,
        notebooks,
        report,
        next_action,
    })
}

pub fn render_status(summary: &StatusSummary, json: bool) -> Result<String> {
    if json {
        let text = serde_json::to_string_pretty(summary).context("serialize status")?;
        return Ok(format!("{text}\n"));
    }
    let mut lines = vec![format!(
        "environment {}: {}",
        summary.env_name,
        summary.environment.as_str()
    )];
    if summary.notebooks.is_empty() {
        lines.push("notebooks: none".to_string());
    } else {
        lines.push("notebooks:".to_string());
        for notebook in &summary.notebooks {
            let mut line = format!("  {}: {}", notebook.path, notebook.state.as_str());
            if let Some(failure) = notebook.failure.as_deref() {
                line.push_str(&format!(" ({failure})"));
            }
            lines.push(line);
        }
    }
    lines.push(format!("report: {}", summary.report.as_str()));
    if let Some(next) = summary.next_action.as_deref() {
        lines.push(format!("next: {next}"));
    }
    Ok(format!("{}\n", lines.join("\n")))
}

//! Cleanup step.
//!
//! Removes every generated artifact and uninstalls the package. Paths that
//! are already gone are skipped, so running clean twice leaves the same tree
//! as running it once.
use super::{ensure_success, PipelineContext};
use crate::error::StepFailure;
use crate::runner::Tool;
use crate::util::display_path;
use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub removed: Vec<PathBuf>,
    pub uninstalled: bool,
}

fn cleanup_failure(action: &str, path: &Path, err: io::Error) -> StepFailure {
    StepFailure::Cleanup {
        detail: format!("{action} {}: {err}", path.display()),
        exit_code: None,
    }
}

/// `tims clean`: delete generated artifacts, then uninstall the package
/// unless `keep_package` is set.
pub fn run_clean(ctx: &PipelineContext<'_>, keep_package: bool) -> Result<CleanSummary> {
    let paths = &ctx.paths;
    let config = paths.config();
    let mut summary = CleanSummary::default();

    for dir in &paths.artifact_dirs() {
        summary.removed.extend(empty_dir(dir)?);
    }

    let removed_dirs = [
        paths.build_dir(),
        paths.executed_dir(),
        paths.report_output_dir(),
        paths.state_dir(),
    ];
    for dir in &removed_dirs {
        if remove_path(dir)? {
            summary.removed.push(dir.clone());
        }
    }

    let patterns = config
        .package
        .metadata_patterns
        .iter()
        .map(|pattern| glob_regex(pattern))
        .collect::<Result<Vec<_>>>()?;
    let mut search_dirs = vec![paths.package_dir()];
    search_dirs.extend(paths.package_source_dirs());
    search_dirs.sort();
    search_dirs.dedup();
    for dir in &search_dirs {
        summary.removed.extend(remove_matching(dir, &patterns)?);
    }
    for path in &summary.removed {
        tracing::debug!(path = %display_path(path, Some(paths.root())), "removed");
    }

    if !keep_package {
        let invocation = ctx
            .tools()
            .command(Tool::Pip, ["uninstall", "-y", config.package.name.as_str()])?;
        tracing::info!(package = %config.package.name, "uninstalling package");
        let outcome = ctx.runner.run(&invocation).context("uninstall package")?;
        ensure_success(&invocation, &outcome, |detail, exit_code| {
            StepFailure::Cleanup { detail, exit_code }
        })?;
        summary.uninstalled = true;
    }
    tracing::info!(
        removed = summary.removed.len(),
        uninstalled = summary.uninstalled,
        "clean complete"
    );
    Ok(summary)
}

/// Anchored regex for a single-component glob (`*` and `?` only).
fn glob_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).with_context(|| format!("invalid metadata pattern {pattern}"))
}

fn empty_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(cleanup_failure("read", dir, err).into()),
    };
    let mut removed = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| cleanup_failure("read", dir, err))?.path();
        if remove_path(&path)? {
            removed.push(path);
        }
    }
    Ok(removed)
}

fn remove_matching(dir: &Path, patterns: &[Regex]) -> Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(cleanup_failure("read", dir, err).into()),
    };
    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| cleanup_failure("read", dir, err))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if patterns.iter().any(|pattern| pattern.is_match(&name)) {
            let path = entry.path();
            if remove_path(&path)? {
                removed.push(path);
            }
        }
    }
    Ok(removed)
}

/// Remove a file, symlink, or directory tree. Returns false when absent.
fn remove_path(path: &Path) -> Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(cleanup_failure("inspect", path, err).into()),
    };
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(cleanup_failure("remove", path, err).into()),
    }
}

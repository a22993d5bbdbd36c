//! Pipeline configuration helpers.
//!
//! This module loads, validates, and normalizes the project-owned `tims.json`
//! so every step works from the same declared layout. A missing file means
//! the built-in defaults, which mirror the original Makefile targets.
use crate::project::CONFIG_FILE_NAME;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub schema_version: u32,
    #[serde(default = "default_env_name")]
    pub env_name: String,
    #[serde(default = "default_manifest")]
    pub manifest: String,
    #[serde(default)]
    pub package: PackageConfig,
    #[serde(default)]
    pub notebooks: Vec<NotebookSpec>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub tools: ToolCommands,
    #[serde(default)]
    pub test_args: Vec<String>,
    #[serde(default = "default_figures_dir")]
    pub figures_dir: String,
    #[serde(default = "default_build_dir")]
    pub build_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_dir: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageConfig {
    pub name: String,
    pub dir: String,
    pub source_dirs: Vec<String>,
    pub metadata_patterns: Vec<String>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: "tools".to_string(),
            dir: ".".to_string(),
            source_dirs: vec!["tools".to_string()],
            metadata_patterns: vec!["*.egg-info".to_string()],
        }
    }
}

/// One analysis notebook plus what it needs to be up to date.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotebookSpec {
    pub path: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
}

impl NotebookSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            depends_on: Vec::new(),
            inputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Replace the source notebook with its executed version.
    #[default]
    InPlace,
    /// Write executed notebooks under `executed_dir`, leaving sources alone.
    Separate,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub executed_dir: String,
    pub timeout_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            executed_dir: default_executed_dir(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub config: String,
    pub output_dir: String,
    pub build_args: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            config: "myst.yml".to_string(),
            output_dir: "_build/html".to_string(),
            build_args: vec!["build".to_string(), "--html".to_string()],
        }
    }
}

/// Command templates for the external tools, split with shell-words.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolCommands {
    pub conda: String,
    pub pip: String,
    pub jupyter: String,
    pub myst: String,
    pub pytest: String,
    pub run_in_env: bool,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            conda: "conda".to_string(),
            pip: "python -m pip".to_string(),
            jupyter: "jupyter".to_string(),
            myst: "myst".to_string(),
            pytest: "pytest".to_string(),
            run_in_env: true,
        }
    }
}

fn default_env_name() -> String {
    "tims".to_string()
}

fn default_manifest() -> String {
    "environment.yml".to_string()
}

fn default_figures_dir() -> String {
    "figures".to_string()
}

fn default_build_dir() -> String {
    "_build".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_state_dir() -> String {
    ".tims".to_string()
}

fn default_executed_dir() -> String {
    "_build/executed".to_string()
}

fn default_timeout_seconds() -> u64 {
    600
}

/// Build the config used when a project has no `tims.json`.
pub fn default_config() -> PipelineConfig {
    PipelineConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        env_name: default_env_name(),
        manifest: default_manifest(),
        package: PackageConfig::default(),
        notebooks: Vec::new(),
        execution: ExecutionConfig::default(),
        report: ReportConfig::default(),
        tools: ToolCommands::default(),
        test_args: Vec::new(),
        figures_dir: default_figures_dir(),
        build_dir: default_build_dir(),
        audio_dir: None,
        data_dir: default_data_dir(),
        state_dir: default_state_dir(),
    }
}

/// Load `tims.json`, falling back to defaults when the file is absent.
pub fn load_config(project_root: &Path) -> Result<PipelineConfig> {
    let path = project_root.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no pipeline config; using defaults");
        return Ok(default_config());
    }
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: PipelineConfig =
        serde_json::from_slice(&bytes).context("parse pipeline config JSON")?;
    validate_config(&config).with_context(|| format!("validate {}", path.display()))?;
    Ok(config)
}

/// Persist a config to disk in a stable JSON format.
#[cfg(test)]
pub fn write_config(project_root: &Path, config: &PipelineConfig) -> Result<()> {
    let path = project_root.join(CONFIG_FILE_NAME);
    let text = serde_json::to_string_pretty(config).context("serialize pipeline config")?;
    fs::write(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Validate schema, paths, and the declared notebook graph.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported pipeline config schema_version {}",
            config.schema_version
        ));
    }
    if config.env_name.trim().is_empty() {
        return Err(anyhow!("env_name must be non-empty"));
    }
    if config.package.name.trim().is_empty() {
        return Err(anyhow!("package.name must be non-empty"));
    }
    if config.execution.timeout_seconds == 0 {
        return Err(anyhow!("execution.timeout_seconds must be positive"));
    }

    validate_relative_path(&config.manifest, "manifest")?;
    validate_relative_path(&config.package.dir, "package.dir")?;
    for rel in &config.package.source_dirs {
        validate_relative_path(rel, "package.source_dirs")?;
    }
    for (label, rel) in [
        ("figures_dir", &config.figures_dir),
        ("build_dir", &config.build_dir),
        ("data_dir", &config.data_dir),
        ("state_dir", &config.state_dir),
        ("execution.executed_dir", &config.execution.executed_dir),
        ("report.config", &config.report.config),
        ("report.output_dir", &config.report.output_dir),
    ] {
        validate_relative_path(rel, label)?;
        if rel.trim().is_empty() || Path::new(rel) == Path::new(".") {
            return Err(anyhow!("{label} must name a path inside the project"));
        }
    }
    if let Some(audio) = config.audio_dir.as_deref() {
        validate_relative_path(audio, "audio_dir")?;
    }
    for (label, command) in [
        ("tools.conda", &config.tools.conda),
        ("tools.pip", &config.tools.pip),
        ("tools.jupyter", &config.tools.jupyter),
        ("tools.myst", &config.tools.myst),
        ("tools.pytest", &config.tools.pytest),
    ] {
        let words = shell_words::split(command).with_context(|| format!("parse {label}"))?;
        if words.is_empty() {
            return Err(anyhow!("{label} must be a non-empty command"));
        }
    }

    let mut declared = BTreeSet::new();
    for notebook in &config.notebooks {
        validate_relative_path(&notebook.path, "notebooks.path")?;
        if !notebook.path.ends_with(".ipynb") {
            return Err(anyhow!(
                "notebook {:?} must be an .ipynb file",
                notebook.path
            ));
        }
        if !declared.insert(notebook.path.as_str()) {
            return Err(anyhow!("notebook {:?} declared twice", notebook.path));
        }
        for input in &notebook.inputs {
            validate_relative_path(input, "notebooks.inputs")?;
        }
    }
    for notebook in &config.notebooks {
        for dep in &notebook.depends_on {
            if !declared.contains(dep.as_str()) {
                return Err(anyhow!(
                    "notebook {:?} depends on undeclared notebook {:?}",
                    notebook.path,
                    dep
                ));
            }
            if dep == &notebook.path {
                return Err(anyhow!("notebook {:?} depends on itself", notebook.path));
            }
        }
    }
    Ok(())
}

fn validate_relative_path(rel: &str, label: &str) -> Result<()> {
    let path = Path::new(rel);
    if path.is_absolute() || has_parent_components(path) {
        return Err(anyhow!(
            "{label} entries must be relative paths without '..' (got {rel:?})"
        ));
    }
    Ok(())
}

fn has_parent_components(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, std::path::Component::ParentDir))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

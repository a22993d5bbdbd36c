//! Typed paths into a project checkout.
//!
//! Centralizing path construction keeps file access consistent across the
//! pipeline steps and prevents drift when the layout evolves.
use crate::config::PipelineConfig;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "tims.json";
pub const STATE_FILE_NAME: &str = "state.json";

/// Convenience wrapper for locating project inputs and generated artifacts.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
    config: PipelineConfig,
}

impl ProjectPaths {
    pub fn new(root: PathBuf, config: PipelineConfig) -> Self {
        Self { root, config }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve a project-relative path.
    pub fn join(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Return the `tims.json` path.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Return the environment manifest path.
    pub fn manifest_path(&self) -> PathBuf {
        self.join(&self.config.manifest)
    }

    /// Return the directory holding build state and staging areas.
    pub fn state_dir(&self) -> PathBuf {
        self.join(&self.config.state_dir)
    }

    /// Return the `state.json` path.
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE_NAME)
    }

    pub fn figures_dir(&self) -> PathBuf {
        self.join(&self.config.figures_dir)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.join(&self.config.build_dir)
    }

    pub fn audio_dir(&self) -> Option<PathBuf> {
        self.config.audio_dir.as_deref().map(|rel| self.join(rel))
    }

    /// Directories notebooks write generated artifacts into.
    pub fn artifact_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.figures_dir()];
        dirs.extend(self.audio_dir());
        dirs
    }

    pub fn data_dir(&self) -> PathBuf {
        self.join(&self.config.data_dir)
    }

    /// Return the default output directory for cleaned tables.
    pub fn clean_data_dir(&self) -> PathBuf {
        self.build_dir().join("clean")
    }

    pub fn package_dir(&self) -> PathBuf {
        self.join(&self.config.package.dir)
    }

    pub fn package_source_dirs(&self) -> Vec<PathBuf> {
        self.config
            .package
            .source_dirs
            .iter()
            .map(|rel| self.join(rel))
            .collect()
    }

    pub fn executed_dir(&self) -> PathBuf {
        self.join(&self.config.execution.executed_dir)
    }

    pub fn report_config_path(&self) -> PathBuf {
        self.join(&self.config.report.config)
    }

    pub fn report_output_dir(&self) -> PathBuf {
        self.join(&self.config.report.output_dir)
    }
}

/// Canonicalize the project root, requiring it to be an existing directory.
pub fn ensure_project_root(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(anyhow!("project root {} is not a directory", root.display()));
    }
    fs::canonicalize(root).with_context(|| format!("resolve project root {}", root.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    #[test]
    fn paths_follow_config() {
        let mut config = default_config();
        config.audio_dir = Some("audio".to_string());
        let paths = ProjectPaths::new(PathBuf::from("/p"), config);
        assert_eq!(paths.config_path(), PathBuf::from("/p/tims.json"));
        assert_eq!(paths.manifest_path(), PathBuf::from("/p/environment.yml"));
        assert_eq!(paths.state_path(), PathBuf::from("/p/.tims/state.json"));
        assert_eq!(paths.clean_data_dir(), PathBuf::from("/p/_build/clean"));
        assert_eq!(paths.audio_dir(), Some(PathBuf::from("/p/audio")));
        assert_eq!(
            paths.artifact_dirs(),
            vec![PathBuf::from("/p/figures"), PathBuf::from("/p/audio")]
        );
    }
}

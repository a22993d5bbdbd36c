use crate::config::load_config;
use crate::project::{ensure_project_root, ProjectPaths};
use crate::runner::{ToolRunner, ToolSet};
use anyhow::Result;
use std::path::Path;

pub struct PipelineContext<'a> {
    pub paths: ProjectPaths,
    pub runner: &'a dyn ToolRunner,
}

impl<'a> PipelineContext<'a> {
    pub fn load(project_root: &Path, runner: &'a dyn ToolRunner) -> Result<Self> {
        let root = ensure_project_root(project_root)?;
        let config = load_config(&root)?;
        let paths = ProjectPaths::new(root, config);
        tracing::debug!(
            config = %paths.config_path().display(),
            exists = paths.config_path().is_file(),
            "pipeline config"
        );
        Ok(Self { paths, runner })
    }

    pub fn tools(&self) -> ToolSet<'_> {
        ToolSet::new(self.paths.config(), self.paths.root())
    }
}

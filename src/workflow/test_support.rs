//! Shared fixtures for workflow step tests.
use super::PipelineContext;
use crate::config::{default_config, write_config, PipelineConfig};
use crate::runner::fake::{failed, ok};
use crate::runner::{Invocation, RunOutcome, ToolRunner};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Defaults with tools invoked directly rather than through `conda run`.
pub fn test_config() -> PipelineConfig {
    let mut config = default_config();
    config.tools.run_in_env = false;
    config
}

pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new(config: PipelineConfig) -> Self {
        let dir = tempfile::tempdir().expect("create project dir");
        let root = dir.path().canonicalize().expect("canonical project dir");
        write_config(&root, &config).expect("write tims.json");
        Self { dir }
    }

    pub fn root(&self) -> std::path::PathBuf {
        self.dir.path().canonicalize().expect("canonical project dir")
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directory");
        }
        fs::write(path, contents).expect("write file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root().join(rel)).expect("read file")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root().join(rel).exists()
    }

    pub fn context<'a>(&self, runner: &'a dyn ToolRunner) -> PipelineContext<'a> {
        PipelineContext::load(&self.root(), runner).expect("load pipeline context")
    }
}

fn arg_after<'a>(inv: &'a Invocation, flag: &str) -> Option<&'a str> {
    inv.args
        .iter()
        .position(|arg| arg == flag)
        .and_then(|idx| inv.args.get(idx + 1))
        .map(String::as_str)
}

/// Stand-in for `jupyter nbconvert --execute`: copies the source notebook
/// into the output directory with a stream output on every code cell. Any
/// notebook whose source contains `raise` fails like a cell error would.
pub fn fake_nbconvert(inv: &Invocation) -> anyhow::Result<RunOutcome> {
    if inv.args.first().map(String::as_str) != Some("nbconvert") {
        return Ok(ok(""));
    }
    let input = arg_after(inv, "--execute").expect("--execute argument");
    let output = arg_after(inv, "--output").expect("--output argument");
    let output_dir = arg_after(inv, "--output-dir").expect("--output-dir argument");

    let source = fs::read_to_string(inv.cwd.join(input)).expect("read notebook");
    if source.contains("raise") {
        return Ok(failed(1));
    }
    let mut notebook: Value = serde_json::from_str(&source).expect("notebook JSON");
    if let Some(cells) = notebook["cells"].as_array_mut() {
        for (idx, cell) in cells.iter_mut().enumerate() {
            if cell["cell_type"] == "code" {
                cell["execution_count"] = Value::from(idx + 1);
                cell["outputs"] = serde_json::json!([
                    {"output_type": "stream", "name": "stdout", "text": ["ran\n"]}
                ]);
            }
        }
    }
    let dest = Path::new(output_dir).join(format!("{output}.ipynb"));
    fs::create_dir_all(output_dir).expect("create output dir");
    fs::write(dest, serde_json::to_vec_pretty(&notebook).expect("serialize")).expect("write");
    Ok(ok(""))
}

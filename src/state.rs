//! Build state: content hashes of the inputs behind every generated artifact.
//!
//! The state ties each artifact to an exact set of inputs so steps can skip
//! work that is already current and status can detect staleness without
//! guessing.
use crate::project::ProjectPaths;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BuildState {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentRecord>,
    #[serde(default)]
    pub notebooks: BTreeMap<String, NotebookRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportRecord>,
    /// Hash of the figure and audio directories as the last notebook run
    /// left them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_hash: Option<String>,
}

impl Default for BuildState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            environment: None,
            notebooks: BTreeMap::new(),
            report: None,
            artifacts_hash: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnvironmentRecord {
    pub env_name: String,
    pub manifest_hash: String,
    pub dependencies: Vec<String>,
    pub applied_at_epoch_ms: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotebookRecord {
    pub inputs_hash: String,
    pub status: RunStatus,
    /// Project-relative path of the executed notebook.
    pub output: String,
    pub finished_at_epoch_ms: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReportRecord {
    pub inputs_hash: String,
    pub built_at_epoch_ms: u128,
}

/// Load the state, treating a missing file as an empty state.
pub fn load_state(paths: &ProjectPaths) -> Result<BuildState> {
    let path = paths.state_path();
    if !path.is_file() {
        return Ok(BuildState::default());
    }
    let bytes = fs::read(&path).with_context(|| format!("read state {}", path.display()))?;
    let state: BuildState = serde_json::from_slice(&bytes).context("parse build state JSON")?;
    if state.schema_version != STATE_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported build state schema_version {} (run `tims clean`)",
            state.schema_version
        ));
    }
    Ok(state)
}

/// Persist the state in a stable JSON format.
pub fn write_state(paths: &ProjectPaths, state: &BuildState) -> Result<()> {
    let path = paths.state_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create state dir")?;
    }
    let text = serde_json::to_string_pretty(state).context("serialize build state")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text.as_bytes()).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Hash a list of paths deterministically for staleness detection.
pub fn hash_paths(root: &Path, paths: &[PathBuf]) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut sorted = paths.to_vec();
    sorted.sort();
    sorted.dedup();
    for path in sorted {
        hash_path(&mut hasher, root, &path)?;
    }
    let digest = hasher.finalize();
    Ok(format!("{:x}", digest))
}

/// Combine labelled component hashes into a single key.
pub fn combine_hashes(parts: &[(&str, &str)]) -> String {
    let mut hasher = Sha256::new();
    for (label, value) in parts {
        hasher.update(label.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn hash_path(hasher: &mut Sha256, root: &Path, path: &Path) -> Result<()> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    if !path.exists() {
        hasher.update(b"missing:");
        hasher.update(rel.to_string_lossy().as_bytes());
        return Ok(());
    }
    let meta = fs::symlink_metadata(path).with_context(|| format!("inspect {}", path.display()))?;
    let file_type = meta.file_type();
    if file_type.is_symlink() {
        hasher.update(b"symlink:");
        hasher.update(rel.to_string_lossy().as_bytes());
        let target = fs::read_link(path).with_context(|| format!("read {}", path.display()))?;
        hasher.update(target.to_string_lossy().as_bytes());
        return Ok(());
    }
    if file_type.is_dir() {
        hasher.update(b"dir:");
        hasher.update(rel.to_string_lossy().as_bytes());
        let mut entries: Vec<_> = fs::read_dir(path)
            .with_context(|| format!("read {}", path.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| !is_ignored_entry(&entry.file_name().to_string_lossy()))
            .collect();
        entries.sort_by_key(|entry| entry.file_name());
        for entry in entries {
            hash_path(hasher, root, &entry.path())?;
        }
        return Ok(());
    }
    if file_type.is_file() {
        hasher.update(b"file:");
        hasher.update(rel.to_string_lossy().as_bytes());
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        hasher.update(&bytes);
        return Ok(());
    }
    Ok(())
}

// interpreter caches and packaging metadata change without any source edit
fn is_ignored_entry(name: &str) -> bool {
    name == "__pycache__"
        || name == ".ipynb_checkpoints"
        || name == ".pytest_cache"
        || name.ends_with(".pyc")
        || name.ends_with(".egg-info")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    fn project(root: &Path) -> ProjectPaths {
        ProjectPaths::new(root.to_path_buf(), default_config())
    }

    #[test]
    fn missing_state_is_empty() {
        let root = tempfile::tempdir().expect("tempdir");
        let state = load_state(&project(root.path())).expect("load");
        assert_eq!(state, BuildState::default());
    }

    #[test]
    fn state_round_trips_through_disk() {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = project(root.path());
        let mut state = BuildState::default();
        state.notebooks.insert(
            "eda.ipynb".to_string(),
            NotebookRecord {
                inputs_hash: "abc".to_string(),
                status: RunStatus::Failed,
                output: "eda.ipynb".to_string(),
                finished_at_epoch_ms: 7,
                failure: Some("cell 3: KeyError".to_string()),
            },
        );
        write_state(&paths, &state).expect("write");
        assert_eq!(load_state(&paths).expect("load"), state);
        assert!(!paths.state_dir().join("state.json.tmp").exists());
    }

    #[test]
    fn hash_changes_with_content_and_ignores_caches() {
        let root = tempfile::tempdir().expect("tempdir");
        let pkg = root.path().join("tools");
        fs::create_dir_all(pkg.join("__pycache__")).expect("mkdir");
        fs::write(pkg.join("KDE.py"), "def plot(): pass\n").expect("write");
        let inputs = vec![pkg.clone()];
        let first = hash_paths(root.path(), &inputs).expect("hash");

        fs::write(pkg.join("__pycache__/KDE.cpython-311.pyc"), [0u8, 1, 2]).expect("write");
        assert_eq!(hash_paths(root.path(), &inputs).expect("hash"), first);

        fs::write(pkg.join("KDE.py"), "def plot(): return 1\n").expect("write");
        assert_ne!(hash_paths(root.path(), &inputs).expect("hash"), first);
    }

    #[test]
    fn missing_inputs_hash_differently_from_present_ones() {
        let root = tempfile::tempdir().expect("tempdir");
        let data = root.path().join("Crashes.csv");
        let missing = hash_paths(root.path(), std::slice::from_ref(&data)).expect("hash");
        fs::write(&data, "").expect("write");
        let present = hash_paths(root.path(), &[data]).expect("hash");
        assert_ne!(missing, present);
    }

    #[test]
    fn combined_hash_depends_on_every_part() {
        let a = combine_hashes(&[("manifest", "1"), ("notebook", "2")]);
        let b = combine_hashes(&[("manifest", "1"), ("notebook", "3")]);
        assert_ne!(a, b);
    }
}

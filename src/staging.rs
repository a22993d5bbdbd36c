//! Staged publication of executed notebooks.
//!
//! The executor writes into a staging tree that mirrors the project layout.
//! The project only changes once the staged notebook has been validated and
//! `StagingArea::publish` swaps it in with a rename.
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A per-run transaction directory, removed on drop.
pub struct StagingArea {
    txn: tempfile::TempDir,
}

impl StagingArea {
    /// Create a fresh transaction directory under `state_dir`.
    pub fn create(state_dir: &Path, prefix: &str) -> Result<Self> {
        fs::create_dir_all(state_dir)
            .with_context(|| format!("create {}", state_dir.display()))?;
        let txn = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(state_dir)
            .with_context(|| format!("create staging area in {}", state_dir.display()))?;
        Ok(Self { txn })
    }

    /// Staged location for a project-relative path.
    pub fn path_for(&self, rel_path: &str) -> PathBuf {
        self.txn.path().join("staging").join(rel_path)
    }

    /// Replace `project_root/rel_path` with its staged copy.
    ///
    /// The copy goes to a hidden sibling first, so the destination is either
    /// the previous file or the complete new one.
    pub fn publish(&self, rel_path: &str, project_root: &Path) -> Result<PathBuf> {
        let staged = self.path_for(rel_path);
        if !staged.is_file() {
            return Err(anyhow!("nothing staged for {rel_path}"));
        }
        let dest = project_root.join(rel_path);
        let parent = dest
            .parent()
            .ok_or_else(|| anyhow!("{} has no parent directory", dest.display()))?;
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        let file_name = dest
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("invalid file name {}", dest.display()))?;
        let tmp_path = parent.join(format!(".{file_name}.tmp"));
        fs::copy(&staged, &tmp_path).with_context(|| format!("publish {}", dest.display()))?;
        if let Err(err) = fs::rename(&tmp_path, &dest) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err).with_context(|| format!("publish {}", dest.display()));
        }
        Ok(dest)
    }
}

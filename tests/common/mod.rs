//! Shared test infrastructure for integration tests.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// True when every named stand-in tool is available; logs a skip otherwise.
pub fn tools_available(names: &[&str]) -> bool {
    for name in names {
        if find_in_path(name).is_none() {
            eprintln!("Skipping: {name} not available");
            return false;
        }
    }
    true
}

/// A throwaway project root with a `tims.json` whose tools are stand-ins.
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new(tools: Value) -> Self {
        let dir = tempfile::tempdir().expect("create project dir");
        let config = json!({
            "schema_version": 1,
            "notebooks": [{"path": "cleaning.ipynb"}],
            "tools": tools,
        });
        fs::write(
            dir.path().join("tims.json"),
            serde_json::to_vec_pretty(&config).expect("serialize config"),
        )
        .expect("write tims.json");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
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

    /// Run `tims --project <root> <args>`.
    pub fn tims(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_tims"))
            .arg("--project")
            .arg(self.root())
            .args(args)
            .env("TIMS_LOG", "warn")
            .output()
            .expect("run tims")
    }
}

pub fn notebook(source: &str) -> String {
    serde_json::to_string_pretty(&json!({
        "cells": [{
            "cell_type": "code",
            "execution_count": null,
            "metadata": {},
            "outputs": [],
            "source": source,
        }],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5,
    }))
    .expect("serialize notebook")
}

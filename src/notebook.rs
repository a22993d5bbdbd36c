//! Minimal reader for Jupyter notebook documents.
//!
//! The pipeline never edits notebook JSON. It needs two views of a notebook:
//! a digest of what the author wrote (cell kinds and sources, ignoring
//! outputs and execution counts) and the list of error outputs left behind by
//! an execution.
use crate::util::sha256_hex;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

/// An `error` output recorded on a code cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellError {
    pub cell_index: usize,
    pub ename: String,
    pub evalue: String,
}

impl std::fmt::Display for CellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell {}: {}: {}", self.cell_index, self.ename, self.evalue)
    }
}

#[derive(Debug, Clone)]
pub struct NotebookDocument {
    root: Value,
}

impl NotebookDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let root: Value = serde_json::from_slice(bytes).context("parse notebook JSON")?;
        if root.get("nbformat").and_then(Value::as_u64).is_none() {
            return Err(anyhow!("notebook is missing nbformat"));
        }
        if !root.get("cells").is_some_and(Value::is_array) {
            return Err(anyhow!("notebook is missing a cells array"));
        }
        Ok(Self { root })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read notebook {}", path.display()))?;
        Self::parse(&bytes).with_context(|| format!("load notebook {}", path.display()))
    }

    fn cells(&self) -> &[Value] {
        self.root
            .get("cells")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn cell_count(&self) -> usize {
        self.cells().len()
    }

    pub fn code_cell_count(&self) -> usize {
        self.cells()
            .iter()
            .filter(|cell| cell_type(cell) == "code")
            .count()
    }

    /// Hash of cell kinds and sources only.
    pub fn source_digest(&self) -> String {
        let authored: Vec<Value> = self
            .cells()
            .iter()
            .map(|cell| {
                json!({
                    "cell_type": cell_type(cell),
                    "source": cell_source(cell),
                })
            })
            .collect();
        let canonical = serde_json::to_vec(&authored).unwrap_or_default();
        sha256_hex(&canonical)
    }

    /// Error outputs in cell order.
    pub fn errors(&self) -> Vec<CellError> {
        let mut errors = Vec::new();
        for (cell_index, cell) in self.cells().iter().enumerate() {
            let Some(outputs) = cell.get("outputs").and_then(Value::as_array) else {
                continue;
            };
            for output in outputs {
                if output.get("output_type").and_then(Value::as_str) != Some("error") {
                    continue;
                }
                errors.push(CellError {
                    cell_index,
                    ename: string_field(output, "ename"),
                    evalue: string_field(output, "evalue"),
                });
            }
        }
        errors
    }
}

fn cell_type(cell: &Value) -> &str {
    cell.get("cell_type").and_then(Value::as_str).unwrap_or("")
}

// nbformat allows source as a string or a list of lines
fn cell_source(cell: &Value) -> String {
    match cell.get("source") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    /// Serialized notebook with the given code sources and no outputs.
    pub fn notebook_json(sources: &[&str]) -> String {
        let cells: Vec<_> = sources
            .iter()
            .map(|source| {
                json!({
                    "cell_type": "code",
                    "execution_count": null,
                    "metadata": {},
                    "outputs": [],
                    "source": source,
                })
            })
            .collect();
        serde_json::to_string_pretty(&json!({
            "cells": cells,
            "metadata": {},
            "nbformat": 4,
            "nbformat_minor": 5,
        }))
        .expect("serialize notebook")
    }
}

//! Notebook set resolution and execution ordering.
//!
//! Notebooks run in the topological order of their declared `depends_on`
//! edges. Ties keep declaration order, so the order is fully determined by
//! `tims.json` and never by directory listing.
use crate::config::NotebookSpec;
use crate::project::ProjectPaths;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::fs;

/// Declared notebooks, or every root-level `*.ipynb` when none are declared.
pub fn notebook_set(paths: &ProjectPaths) -> Result<Vec<NotebookSpec>> {
    let declared = &paths.config().notebooks;
    if !declared.is_empty() {
        return Ok(declared.clone());
    }
    let mut discovered = Vec::new();
    let root = paths.root();
    for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("ipynb") {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            discovered.push(name.to_string());
        }
    }
    discovered.sort();
    if !discovered.is_empty() {
        tracing::warn!(
            count = discovered.len(),
            "no notebooks declared in tims.json; running discovered notebooks in name order"
        );
    }
    Ok(discovered.into_iter().map(NotebookSpec::new).collect())
}

/// Order notebooks so every notebook runs after the notebooks it depends on.
pub fn execution_order(notebooks: &[NotebookSpec]) -> Result<Vec<NotebookSpec>> {
    let declared: BTreeSet<&str> = notebooks.iter().map(|nb| nb.path.as_str()).collect();
    for notebook in notebooks {
        for dep in &notebook.depends_on {
            if !declared.contains(dep.as_str()) {
                return Err(anyhow!(
                    "notebook {} depends on unknown notebook {}",
                    notebook.path,
                    dep
                ));
            }
        }
    }

    let mut done: BTreeSet<&str> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(notebooks.len());
    while ordered.len() < notebooks.len() {
        let next = notebooks.iter().find(|nb| {
            !done.contains(nb.path.as_str())
                && nb.depends_on.iter().all(|dep| done.contains(dep.as_str()))
        });
        let Some(next) = next else {
            let blocked = notebooks
                .iter()
                .filter(|nb| !done.contains(nb.path.as_str()))
                .map(|nb| nb.path.as_str())
                .collect::<Vec<_>>();
            return Err(anyhow!(
                "notebook dependency cycle among: {}",
                blocked.join(", ")
            ));
        };
        done.insert(next.path.as_str());
        ordered.push(next.clone());
    }
    Ok(ordered)
}

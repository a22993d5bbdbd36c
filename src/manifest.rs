//! Conda environment manifest parsing.
//!
//! The manifest is the single declarative input of the provisioner. We only
//! read enough of it to hash it, name the environment, and report which
//! dependencies an update will add, change, or prune.
use crate::util::sha256_hex;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    channels: Vec<String>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Spec(String),
    Pip { pip: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DependencySource {
    Conda,
    Pip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub source: DependencySource,
    pub name: String,
    /// Version constraint exactly as written (`=2.0`, `>=3.10`, ...).
    pub constraint: Option<String>,
}

impl Dependency {
    /// Identity used to match dependencies across manifest revisions.
    pub fn key(&self) -> String {
        match self.source {
            DependencySource::Conda => self.name.clone(),
            DependencySource::Pip => format!("pip:{}", self.name),
        }
    }

    pub fn render(&self) -> String {
        format!("{}{}", self.key(), self.constraint.as_deref().unwrap_or(""))
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentManifest {
    pub name: Option<String>,
    pub channels: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub hash: String,
}

impl EnvironmentManifest {
    pub fn rendered_dependencies(&self) -> Vec<String> {
        self.dependencies.iter().map(Dependency::render).collect()
    }
}

/// Load and parse the manifest, hashing its exact bytes.
pub fn load_manifest(path: &Path) -> Result<EnvironmentManifest> {
    let bytes = fs::read(path).with_context(|| format!("read manifest {}", path.display()))?;
    let text = String::from_utf8(bytes).context("manifest is not valid UTF-8")?;
    let mut manifest =
        parse_manifest(&text).with_context(|| format!("parse manifest {}", path.display()))?;
    manifest.hash = sha256_hex(text.as_bytes());
    Ok(manifest)
}

pub fn parse_manifest(text: &str) -> Result<EnvironmentManifest> {
    let raw: RawManifest = serde_yaml::from_str(text).context("parse manifest YAML")?;
    let mut dependencies = Vec::new();
    for entry in raw.dependencies {
        match entry {
            RawDependency::Spec(spec) => {
                dependencies.push(parse_dependency(&spec, DependencySource::Conda)?)
            }
            RawDependency::Pip { pip } => {
                for spec in pip {
                    dependencies.push(parse_dependency(&spec, DependencySource::Pip)?);
                }
            }
        }
    }
    if dependencies.is_empty() {
        return Err(anyhow!("manifest lists no dependencies"));
    }
    Ok(EnvironmentManifest {
        name: raw.name,
        channels: raw.channels,
        dependencies,
        hash: sha256_hex(text.as_bytes()),
    })
}

fn dependency_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:[A-Za-z0-9_.\-]+::)?([A-Za-z0-9_][A-Za-z0-9_.\-]*(?:\[[^\]]*\])?)\s*([=<>!~].*|[0-9].*)?$",
        )
        .expect("dependency regex")
    })
}

fn parse_dependency(spec: &str, source: DependencySource) -> Result<Dependency> {
    let trimmed = spec.trim();
    let caps = dependency_regex()
        .captures(trimmed)
        .ok_or_else(|| anyhow!("invalid dependency spec {spec:?}"))?;
    let name = caps
        .get(1)
        .map(|m| m.as_str().to_ascii_lowercase())
        .ok_or_else(|| anyhow!("invalid dependency spec {spec:?}"))?;
    let constraint = caps
        .get(2)
        .map(|m| m.as_str().split_whitespace().collect::<String>())
        .filter(|value| !value.is_empty())
        .map(|value| {
            // conda accepts `numpy 1.26` as shorthand for `numpy=1.26`
            if value.starts_with(|c: char| c.is_ascii_digit()) {
                format!("={value}")
            } else {
                value
            }
        });
    Ok(Dependency {
        source,
        name,
        constraint,
    })
}

/// Dependency-level difference between a recorded and a current manifest.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DependencyChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<(String, String)>,
}

impl DependencyChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compare rendered dependency lists by dependency key.
pub fn diff_dependencies(previous: &[String], current: &[String]) -> DependencyChanges {
    let index = |items: &[String]| -> BTreeMap<String, String> {
        items
            .iter()
            .map(|rendered| (rendered_key(rendered), rendered.clone()))
            .collect()
    };
    let before = index(previous);
    let after = index(current);
    let mut changes = DependencyChanges::default();
    for (key, rendered) in &after {
        match before.get(key) {
            None => changes.added.push(rendered.clone()),
            Some(old) if old != rendered => changes.changed.push((old.clone(), rendered.clone())),
            Some(_) => {}
        }
    }
    for (key, rendered) in &before {
        if !after.contains_key(key) {
            changes.removed.push(rendered.clone());
        }
    }
    changes
}

fn rendered_key(rendered: &str) -> String {
    let end = rendered
        .find(['=', '<', '>', '!', '~'])
        .unwrap_or(rendered.len());
    rendered[..end].to_string()
}

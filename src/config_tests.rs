use super::{default_config, load_config, validate_config, write_config, ExecutionMode};
use crate::config::NotebookSpec;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_project_root(name: &str) -> std::path::PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("{name}-{}-{now}", std::process::id()));
    std::fs::create_dir_all(&root).expect("create temp root");
    root
}

#[test]
fn default_config_is_valid() {
    validate_config(&default_config()).expect("default config valid");
}

#[test]
fn missing_config_file_yields_defaults() {
    let root = temp_project_root("tims-config-missing");
    let config = load_config(&root).expect("load defaults");
    assert_eq!(config, default_config());
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn partial_sections_fill_in_defaults() {
    let root = temp_project_root("tims-config-partial");
    std::fs::write(
        root.join("tims.json"),
        r#"{
  "schema_version": 1,
  "env_name": "crash",
  "execution": { "mode": "separate" },
  "tools": { "jupyter": "false", "run_in_env": false },
  "notebooks": [
    { "path": "cleaning.ipynb", "inputs": ["data/Crashes.csv"] },
    { "path": "clusters.ipynb", "depends_on": ["cleaning.ipynb"] }
  ]
}"#,
    )
    .expect("write config");

    let config = load_config(&root).expect("load config");
    assert_eq!(config.env_name, "crash");
    assert_eq!(config.execution.mode, ExecutionMode::Separate);
    assert_eq!(config.execution.executed_dir, "_build/executed");
    assert_eq!(config.tools.jupyter, "false");
    assert_eq!(config.tools.conda, "conda");
    assert!(!config.tools.run_in_env);
    assert_eq!(config.notebooks.len(), 2);
    assert_eq!(config.notebooks[1].depends_on, vec!["cleaning.ipynb"]);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn write_then_load_preserves_config() {
    let root = temp_project_root("tims-config-write");
    let mut config = default_config();
    config.audio_dir = Some("audio".to_string());
    config.notebooks.push(NotebookSpec::new("eda.ipynb"));
    write_config(&root, &config).expect("write config");
    assert_eq!(load_config(&root).expect("reload"), config);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn rejects_unknown_schema_version() {
    let mut config = default_config();
    config.schema_version = 2;
    let err = validate_config(&config).expect_err("schema mismatch");
    assert!(err.to_string().contains("schema_version"));
}

#[test]
fn rejects_paths_escaping_project() {
    let mut config = default_config();
    config.figures_dir = "../figures".to_string();
    assert!(validate_config(&config).is_err());

    let mut config = default_config();
    config.build_dir = "/tmp/build".to_string();
    assert!(validate_config(&config).is_err());

    let mut config = default_config();
    config.state_dir = ".".to_string();
    assert!(validate_config(&config).is_err());
}

#[test]
fn rejects_bad_notebook_declarations() {
    let mut config = default_config();
    config.notebooks.push(NotebookSpec::new("report.md"));
    assert!(validate_config(&config).is_err());

    let mut config = default_config();
    config.notebooks.push(NotebookSpec::new("a.ipynb"));
    config.notebooks.push(NotebookSpec::new("a.ipynb"));
    let err = validate_config(&config).expect_err("duplicate");
    assert!(err.to_string().contains("declared twice"));

    let mut config = default_config();
    let mut notebook = NotebookSpec::new("a.ipynb");
    notebook.depends_on.push("missing.ipynb".to_string());
    config.notebooks.push(notebook);
    let err = validate_config(&config).expect_err("unknown dependency");
    assert!(err.to_string().contains("undeclared"));
}

#[test]
fn rejects_empty_tool_command() {
    let mut config = default_config();
    config.tools.myst = "   ".to_string();
    let err = validate_config(&config).expect_err("empty command");
    assert!(err.to_string().contains("tools.myst"));
}

#[test]
fn rejects_unknown_fields() {
    let root = temp_project_root("tims-config-unknown");
    std::fs::write(
        root.join("tims.json"),
        r#"{ "schema_version": 1, "notebook_glob": "*.ipynb" }"#,
    )
    .expect("write config");
    assert!(load_config(&root).is_err());
    let _ = std::fs::remove_dir_all(&root);
}

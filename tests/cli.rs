mod common;

use common::{notebook, tools_available, Project};
use serde_json::{json, Value};
use std::process::Command;

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn help_lists_every_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_tims"))
        .arg("help")
        .output()
        .expect("run tims help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["clean", "env", "html", "all", "test", "help", "status", "prepare"] {
        assert!(
            stdout.lines().any(|line| line.trim_start().starts_with(name)),
            "missing {name} in:\n{stdout}"
        );
    }
}

#[test]
fn clean_twice_is_idempotent() {
    if !tools_available(&["true"]) {
        return;
    }
    let project = Project::new(json!({"pip": "true", "run_in_env": false}));
    project.write("figures/kde.png", "png");
    project.write("_build/html/index.html", "<html>");
    project.write("tools.egg-info/PKG-INFO", "Name: tools");

    let first = project.tims(&["clean"]);
    assert!(first.status.success(), "{}", stderr(&first));
    assert!(project.exists("figures"));
    assert!(!project.exists("figures/kde.png"));
    assert!(!project.exists("_build"));
    assert!(!project.exists("tools.egg-info"));

    let second = project.tims(&["clean"]);
    assert!(second.status.success(), "{}", stderr(&second));
    assert!(project.exists("figures"));
}

#[test]
fn failing_notebook_halts_all_and_blocks_html() {
    if !tools_available(&["true", "false"]) {
        return;
    }
    let project = Project::new(json!({
        "pip": "true",
        "jupyter": "false",
        "myst": "true",
        "run_in_env": false,
    }));
    let source = notebook("raise ValueError('bad year')");
    project.write("cleaning.ipynb", &source);
    project.write("index.md", "# Fatal crashes\n");
    project.write(
        "myst.yml",
        "version: 1\nproject:\n  toc:\n    - file: index.md\n    - file: cleaning.ipynb\n",
    );

    let all = project.tims(&["all"]);
    assert_eq!(all.status.code(), Some(1), "{}", stderr(&all));
    assert!(stderr(&all).contains("error: notebook cleaning.ipynb failed"));
    assert_eq!(project.read("cleaning.ipynb"), source);

    let status = project.tims(&["status", "--json"]);
    assert!(status.status.success(), "{}", stderr(&status));
    let summary: Value = serde_json::from_slice(&status.stdout).expect("status JSON");
    assert_eq!(summary["notebooks"][0]["state"], "failed");

    let html = project.tims(&["html"]);
    assert!(!html.status.success());
    assert!(stderr(&html).contains("failed their last execution"));
    assert!(!project.exists("_build/html"));
}

#[test]
fn test_command_installs_then_runs_suite() {
    if !tools_available(&["true"]) {
        return;
    }
    let project = Project::new(json!({"pip": "true", "pytest": "true", "run_in_env": false}));
    let output = project.tims(&["test"]);
    assert!(output.status.success(), "{}", stderr(&output));
}

#[test]
fn failing_suite_exit_code_propagates() {
    if !tools_available(&["true", "sh"]) {
        return;
    }
    let project = Project::new(json!({
        "pip": "true",
        "pytest": "sh -c 'exit 3'",
        "run_in_env": false,
    }));
    let output = project.tims(&["test"]);
    assert_eq!(output.status.code(), Some(3), "{}", stderr(&output));
    assert!(stderr(&output).contains("test suite failed"));
}

#[test]
fn missing_tool_is_reported() {
    let project = Project::new(json!({
        "pip": "tims-no-such-installer",
        "run_in_env": false,
    }));
    let output = project.tims(&["test"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("not found on PATH"));
}

#[test]
fn prepare_writes_clean_tables() {
    let project = Project::new(json!({"run_in_env": false}));
    project.write(
        "data/Crashes.csv",
        "CASE_ID,COLLISION_DATE,COLLISION_TIME,POINT_X,POINT_Y,LATITUDE,LONGITUDE,COLLISION_SEVERITY\n\
         1,2019-03-04,1430,-122.41,37.77,,,1\n\
         2,2020-07-01,0905,-122.43,37.75,,,3\n",
    );
    project.write(
        "data/Parties.csv",
        "CASE_ID,PARTY_NUMBER,PARTY_AGE,PARTY_SEX,AT_FAULT,ACCIDENT_YEAR\n1,1,998,M,Y,2019\n2,1,30,F,N,2020\n",
    );
    project.write(
        "data/Victims.csv",
        "CASE_ID,PARTY_NUMBER,VICTIM_AGE,VICTIM_SEX,ACCIDENT_YEAR\n1,1,41,F,2019\n2,1,0,M,2020\n",
    );
    let output = project.tims(&["prepare", "--decode"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let level = project.read("_build/clean/victim_level.csv");
    assert_eq!(level.lines().count(), 3);
    assert!(level.lines().next().unwrap_or("").contains("COLLISION_SEVERITY_DESC"));
}

//! Integration tests for the CLI interface

mod common;

use assert_cmd::Command;
use common::Workspace;
use predicates::prelude::*;

fn merge_csv(workspace: &Workspace) -> Command {
    let mut cmd = Command::cargo_bin("merge-csv").unwrap();
    cmd.current_dir(workspace.path())
        .env_remove("MERGE_CSV_DATA_DIR")
        .env_remove("MERGE_CSV_LEFT")
        .env_remove("MERGE_CSV_RIGHT")
        .env_remove("MERGE_CSV_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = Command::cargo_bin("merge-csv").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("graph"));
}

#[test]
fn test_no_subcommand_runs_pipeline_with_defaults() {
    let workspace = Workspace::new();

    merge_csv(&workspace)
        .assert()
        .success()
        .stdout(predicate::str::contains("✅ convert_to_json"));

    let json: serde_json::Value =
        serde_json::from_str(&workspace.read("data/merged.json")).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 4);
}

#[test]
fn test_run_with_explicit_paths() {
    let workspace = Workspace::empty();
    workspace.write("in/a.csv", "code;name\n1;x\n");
    workspace.write("in/b.csv", "code;name;extra\n1;;y\n2;z;w\n");

    merge_csv(&workspace)
        .args([
            "run",
            "--left",
            "in/a.csv",
            "--right",
            "in/b.csv",
            "--output",
            "out.json",
            "--key",
            "code",
            "--delimiter",
            ";",
            "--sequential",
        ])
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_str(&workspace.read("out.json")).unwrap();
    assert_eq!(json[0]["code"], 1);
    assert_eq!(json[0]["name"], "x");
    assert_eq!(json[1]["name"], "z");
    assert_eq!(json[1]["extra"], "w");
}

#[test]
fn test_missing_input_exits_with_failure() {
    let workspace = Workspace::empty();
    workspace.write("data/file2.csv", common::RIGHT_CSV);
    workspace.write("merge-csv.yml", "retry:\n  default:\n    retries: 0\n");

    merge_csv(&workspace)
        .arg("run")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("❌ read_csv_1"))
        .stdout(predicate::str::contains("merge_csvs"))
        .stderr(predicate::str::contains("E2001"));

    assert!(!workspace.exists("data/merged.json"));
}

#[test]
fn test_missing_key_column_names_column_and_side() {
    let workspace = Workspace::with_inputs("id,name\n1,a\n", "code,name\n1,b\n");

    merge_csv(&workspace)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Key column 'id' missing from right table"));
}

#[test]
fn test_config_file_in_working_directory_is_used() {
    let workspace = Workspace::new();
    workspace.write(
        "merge-csv.yml",
        "name: nightly\noutput: result.json\nretry:\n  default:\n    retries: 0\n",
    );

    merge_csv(&workspace).arg("run").assert().success();

    assert!(workspace.exists("data/result.json"));
    assert!(!workspace.exists("data/merged.json"));
}

#[test]
fn test_env_overrides_output() {
    let workspace = Workspace::new();

    merge_csv(&workspace)
        .env("MERGE_CSV_OUTPUT", "from-env.json")
        .arg("run")
        .assert()
        .success();

    assert!(workspace.exists("data/from-env.json"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let workspace = Workspace::new();

    merge_csv(&workspace)
        .args(["run", "--config", "nope.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));
}

#[test]
fn test_run_report_is_written() {
    let workspace = Workspace::new();

    merge_csv(&workspace)
        .args(["run", "--report", "report.json"])
        .assert()
        .success();

    let report: serde_json::Value = serde_json::from_str(&workspace.read("report.json")).unwrap();
    assert_eq!(report["pipeline"], "split_merge_csv");
    let stages = report["stages"].as_array().unwrap();
    assert_eq!(stages.len(), 4);
    assert!(stages.iter().all(|s| s["status"] == "success"));
    assert_eq!(stages[2]["rows"], 4);
}

#[test]
fn test_graph_text() {
    let workspace = Workspace::empty();

    merge_csv(&workspace)
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "merge_csvs <- read_csv_1, read_csv_2",
        ))
        .stdout(predicate::str::contains("convert_to_json <- merge_csvs"));
}

#[test]
fn test_graph_dot() {
    let workspace = Workspace::empty();

    merge_csv(&workspace)
        .args(["graph", "--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph"));
}

#[test]
fn test_inspect_records_file() {
    let workspace = Workspace::new();
    merge_csv(&workspace).arg("run").assert().success();

    merge_csv(&workspace)
        .args(["inspect", "data/merged.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rows:    4"))
        .stdout(predicate::str::contains("value1 (1 null)"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("merge-csv").unwrap();
    cmd.arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

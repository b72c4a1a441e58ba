//! CLI tests: spawn the `agent` binary and check exit codes and output.

use std::fs;
use std::process::Command;

use agent::exit_codes;
use agent::io::config::{AgentConfig, load_config};

fn agent() -> Command {
    Command::new(env!("CARGO_BIN_EXE_agent"))
}

#[test]
fn estimate_prints_clamped_score() {
    let output = agent()
        .args(["estimate", "Build a full-stack website with an API"])
        .output()
        .expect("agent estimate");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "9");
}

#[test]
fn init_config_refuses_to_overwrite() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("agent.toml");
    let status = agent()
        .arg("init-config")
        .arg("--path")
        .arg(&path)
        .status()
        .expect("init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load"), AgentConfig::default());

    let status = agent()
        .arg("init-config")
        .arg("--path")
        .arg(&path)
        .status()
        .expect("init-config again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn validate_params_reports_missing_field() {
    let temp = tempfile::tempdir().expect("tempdir");
    let schema = temp.path().join("schema.json");
    let params = temp.path().join("params.json");
    fs::write(
        &schema,
        r#"{"type":"object","required":["project_path"],"properties":{"project_path":{"type":"string"}}}"#,
    )
    .expect("write schema");
    fs::write(&params, "{}").expect("write params");

    let output = agent()
        .arg("validate-params")
        .arg(&schema)
        .arg(&params)
        .args(["--mode", "permissive"])
        .output()
        .expect("validate-params");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "Missing Required field project_path"
    );
}

/// Uses `cat` as the model: it echoes the transcript, whose opening prompt
/// mentions the completion marker, so the run stops after one turn.
#[cfg(unix)]
#[test]
fn run_with_echo_model_completes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("agent.toml");
    fs::write(&config, "[model]\ncommand = [\"cat\"]\n").expect("write config");

    let output = agent()
        .current_dir(temp.path())
        .args(["run", "say hello", "--config"])
        .arg(&config)
        .output()
        .expect("agent run");
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first: serde_json::Value =
        serde_json::from_str(stdout.lines().next().expect("event line")).expect("json event");
    assert_eq!(first["type"], "TASK_ANALYSIS_START");
    assert!(stdout.contains("\"TASK_COMPLETE\""));
    assert!(stdout.contains("\"totalTurns\": 1"));
}

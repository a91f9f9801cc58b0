//! CLI smoke tests for the `dlog` binary.

mod common;

use serde_json::Value;

fn json_lines(stdout: &str) -> Vec<Value> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("json output line"))
        .collect()
}

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"], "");
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: dlog [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn record_then_decode_round_trips_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let dir_arg = dir.path().to_string_lossy().into_owned();

    let record = common::run_cli_case(
        "record_plain",
        &["record", "--tag", "app", "--dir", &dir_arg, "--plain"],
        "first line\n\nsecond|line\n",
    );
    assert!(
        record.status.success(),
        "record failed; log: {}",
        record.log_path.display()
    );
    let summary = &json_lines(&record.stdout)[0];
    assert_eq!(summary["command"], "record");
    assert_eq!(summary["recorded"], 2);
    assert_eq!(summary["state"], "PlainActive");

    let names = common::file_names(dir.path());
    assert_eq!(names.len(), 1, "files: {names:?}");
    let file = dir.path().join(&names[0]).to_string_lossy().into_owned();

    let decode = common::run_cli_case("decode_plain", &["decode", &file], "");
    assert!(
        decode.status.success(),
        "decode failed; log: {}",
        decode.log_path.display()
    );
    let lines = json_lines(&decode.stdout);
    let tags: Vec<&str> = lines.iter().filter_map(|l| l["tag"].as_str()).collect();
    assert_eq!(tags, ["basic", "app", "app"]);
    assert_eq!(lines[2]["payload"], "second|line");
}

#[test]
fn record_with_stage_leaves_only_the_active_file_unstaged() {
    let dir = tempfile::tempdir().unwrap();
    let dir_arg = dir.path().to_string_lossy().into_owned();

    let result = common::run_cli_case(
        "record_stage",
        &["record", "-t", "app", "--dir", &dir_arg, "--stage"],
        "one\ntwo\n",
    );
    assert!(
        result.status.success(),
        "record --stage failed; log: {}",
        result.log_path.display()
    );
    assert_eq!(json_lines(&result.stdout)[0]["staged"], true);

    let names = common::file_names(dir.path());
    assert_eq!(names.iter().filter(|n| n.ends_with("-up")).count(), 1);
    assert_eq!(names.iter().filter(|n| !n.contains("-up")).count(), 1);
}

#[test]
fn stage_command_skips_active_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("2026-01-01"), b"x\n").unwrap();
    std::fs::write(dir.path().join("2026-01-02"), b"y\n").unwrap();
    let dir_arg = dir.path().to_string_lossy().into_owned();

    let result = common::run_cli_case(
        "stage_command",
        &["stage", &dir_arg, "--active", "2026-01-02"],
        "",
    );
    assert!(
        result.status.success(),
        "stage failed; log: {}",
        result.log_path.display()
    );
    assert_eq!(
        common::file_names(dir.path()),
        ["2026-01-01-up", "2026-01-02"]
    );
}

#[test]
fn config_command_emits_json() {
    let result = common::run_cli_case("config_json", &["config", "--json"], "");
    assert!(
        result.status.success(),
        "config failed; log: {}",
        result.log_path.display()
    );
    let payload = &json_lines(&result.stdout)[0];
    assert_eq!(payload["command"], "config");
    assert_eq!(payload["config"]["queue"]["capacity"], 4096);
}

#[test]
fn missing_explicit_config_is_a_user_error() {
    let result = common::run_cli_case(
        "missing_config",
        &["--config", "/nonexistent/dlog.toml", "config"],
        "",
    );
    assert_eq!(result.status.code(), Some(1));
    assert!(result.stderr.contains("DLG-"));
}

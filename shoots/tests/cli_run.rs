//! CLI tests for the `shoots` binary.
//!
//! Spawns the binary in a temp working directory and checks exit codes and
//! the `key=value` summary it prints.

use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use shoots::core::plan::Plan;
use shoots::exit_codes;

fn shoots(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shoots"))
        .current_dir(cwd)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run shoots")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn ping_prints_summary_and_exits_zero() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = shoots(temp.path(), &["core.ping"]);

    assert_eq!(output.status.code(), Some(exit_codes::SUCCESS));
    let hash = Plan::from_input("core.ping").expect("plan").hash;
    let lines = stdout_lines(&output);
    assert!(lines.contains(&"[builder] module: core v1.0.0".to_string()));
    assert!(lines.contains(&"[result] ok".to_string()));
    assert_eq!(
        &lines[lines.len() - 3..],
        &[
            "state=Success".to_string(),
            format!("hash={hash}"),
            format!("folder={}", Path::new("artifacts").join(&hash).display()),
        ]
    );
    assert!(temp.path().join("artifacts").join(&hash).join("result.json").exists());
}

#[test]
fn unknown_command_exits_invalid_with_reason() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = shoots(temp.path(), &["nonexistent.command"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let lines = stdout_lines(&output);
    assert!(lines.contains(&"state=Invalid".to_string()));
    assert_eq!(lines.last().map(String::as_str), Some("reason=unknown_command"));
}

#[test]
fn words_are_joined_before_hashing() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = shoots(temp.path(), &["help", "core.ping"]);

    assert_eq!(output.status.code(), Some(exit_codes::SUCCESS));
    let hash = Plan::from_input("help core.ping").expect("plan").hash;
    assert!(stdout_lines(&output).contains(&format!("hash={hash}")));
    let plan = fs::read_to_string(temp.path().join("artifacts").join(&hash).join("plan.txt"))
        .expect("read plan");
    assert_eq!(plan, "COMMAND:\nhelp core.ping\n");
}

#[test]
fn missing_command_is_an_argument_error() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = shoots(temp.path(), &[]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(!temp.path().join("artifacts").exists());
}

#[test]
fn config_and_flags_choose_directories() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("shoots.toml"),
        "artifacts_dir = \"from-config\"\n",
    )
    .expect("write config");

    let from_config = shoots(temp.path(), &["core.ping"]);
    let from_flag = shoots(temp.path(), &["--artifacts-dir", "from-flag", "core.ping"]);

    assert_eq!(from_config.status.code(), Some(exit_codes::SUCCESS));
    assert_eq!(from_flag.status.code(), Some(exit_codes::SUCCESS));
    assert!(temp.path().join("from-config").is_dir());
    assert!(temp.path().join("from-flag").is_dir());
}

#[test]
fn invalid_config_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("shoots.toml"), "module_timeout_secs = 0\n").expect("write");

    let output = shoots(temp.path(), &["core.ping"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("module_timeout_secs"));
    assert!(stdout_lines(&output).iter().all(|line| !line.starts_with("state=")));
}

#[test]
fn closed_stdout_does_not_abort_the_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut child = Command::new(env!("CARGO_BIN_EXE_shoots"))
        .current_dir(temp.path())
        .arg("nonexistent.command")
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn shoots");
    drop(child.stdout.take());

    let output = child.wait_with_output().expect("wait shoots");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(!String::from_utf8_lossy(&output.stderr).contains("panicked"));
    let hash = Plan::from_input("nonexistent.command").expect("plan").hash;
    let folder = temp.path().join("artifacts").join(&hash);
    assert!(folder.join("result.json").exists());
    assert!(folder.join("resolution.json").exists());
}

//! CLI tests for the gate binary.
//!
//! Spawns the real binary against local bare repositories and verifies the
//! stable exit-code contract.

use std::path::Path;
use std::process::{Command, Output};

use gate::exit_codes;
use gate::io::config::{GateConfig, HookCommands, write_config};
use gate::test_support::{RemoteHub, fast_config};

fn gate_cmd(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gate"))
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("run gate binary")
}

fn write_cfg(dir: &Path, cfg: &GateConfig) -> std::path::PathBuf {
    let path = dir.join("gate.toml");
    write_config(&path, cfg).expect("write config");
    path
}

#[test]
fn resolve_prints_the_chosen_ref() {
    let hub = RemoteHub::new().expect("hub");
    hub.add_project("acme/widget").expect("add project");
    hub.commit("acme/widget", "master", "base").expect("commit");
    hub.push_commit("acme/widget", "refs/zuul/master/Z1", "speculative")
        .expect("push ref");

    let temp = tempfile::tempdir().expect("tempdir");
    let cfg = GateConfig {
        base_url: hub.base_url(),
        projects: vec!["acme/widget".to_string()],
        ..fast_config()
    };
    let cfg_path = write_cfg(temp.path(), &cfg);

    let out = gate_cmd(
        &cfg_path,
        &[
            "resolve",
            "--queue-branch",
            "master",
            "--queue-ref",
            "refs/zuul/master/Z1",
            "--project-under-test",
            "acme/widget",
            "--dest-root",
            temp.path().to_str().expect("utf8 path"),
        ],
    );

    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.trim(), "change-ref refs/zuul/master/Z1");
}

#[test]
fn missing_promised_ref_exits_with_ref_not_found() {
    let hub = RemoteHub::new().expect("hub");
    hub.add_project("acme/widget").expect("add project");
    hub.commit("acme/widget", "master", "base").expect("commit");

    let temp = tempfile::tempdir().expect("tempdir");
    let ws = temp.path().join("ws");
    let cfg = GateConfig {
        base_url: hub.base_url(),
        projects: vec!["acme/widget".to_string()],
        ..fast_config()
    };
    let cfg_path = write_cfg(temp.path(), &cfg);

    let out = gate_cmd(
        &cfg_path,
        &[
            "sync",
            "--queue-branch",
            "master",
            "--queue-ref",
            "refs/zuul/master/Zmissing",
            "--project-under-test",
            "acme/widget",
            "--skip-self-project",
            "--dest-root",
            ws.to_str().expect("utf8 path"),
        ],
    );

    assert_eq!(out.status.code(), Some(exit_codes::REF_NOT_FOUND));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("refs/zuul/master/Zmissing"), "stderr: {stderr}");
}

#[test]
fn run_succeeds_and_gate_hook_sees_the_workspace() {
    let hub = RemoteHub::new().expect("hub");
    hub.add_project("acme/widget").expect("add project");
    hub.commit("acme/widget", "master", "base").expect("commit");

    let temp = tempfile::tempdir().expect("tempdir");
    let ws = temp.path().join("ws");
    let cfg = GateConfig {
        base_url: hub.base_url(),
        projects: vec!["acme/widget".to_string()],
        hooks: HookCommands {
            gate: vec![
                "sh".to_string(),
                "-c".to_string(),
                "test -f widget/change.txt".to_string(),
            ],
            ..HookCommands::default()
        },
        ..fast_config()
    };
    let cfg_path = write_cfg(temp.path(), &cfg);

    let out = gate_cmd(
        &cfg_path,
        &[
            "run",
            "--queue-branch",
            "master",
            "--project-under-test",
            "acme/widget",
            "--skip-self-project",
            "--dest-root",
            ws.to_str().expect("utf8 path"),
        ],
    );

    assert_eq!(out.status.code(), Some(exit_codes::OK));
}

#[test]
fn failing_gate_hook_exits_with_hook_failed() {
    let hub = RemoteHub::new().expect("hub");
    hub.add_project("acme/widget").expect("add project");
    hub.commit("acme/widget", "master", "base").expect("commit");

    let temp = tempfile::tempdir().expect("tempdir");
    let ws = temp.path().join("ws");
    let cfg = GateConfig {
        base_url: hub.base_url(),
        projects: vec!["acme/widget".to_string()],
        hooks: HookCommands {
            gate: vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
            ..HookCommands::default()
        },
        ..fast_config()
    };
    let cfg_path = write_cfg(temp.path(), &cfg);

    let out = gate_cmd(
        &cfg_path,
        &[
            "run",
            "--queue-branch",
            "master",
            "--project-under-test",
            "acme/widget",
            "--skip-self-project",
            "--dest-root",
            ws.to_str().expect("utf8 path"),
        ],
    );

    assert_eq!(out.status.code(), Some(exit_codes::HOOK_FAILED));
}

#[test]
fn sync_prints_project_and_head() {
    let hub = RemoteHub::new().expect("hub");
    hub.add_project("acme/widget").expect("add project");
    let master = hub.commit("acme/widget", "master", "base").expect("commit");

    let temp = tempfile::tempdir().expect("tempdir");
    let ws = temp.path().join("ws");
    let cfg = GateConfig {
        base_url: hub.base_url(),
        projects: vec!["acme/widget".to_string()],
        ..fast_config()
    };
    let cfg_path = write_cfg(temp.path(), &cfg);

    let out = gate_cmd(
        &cfg_path,
        &[
            "sync",
            "--queue-branch",
            "master",
            "--project-under-test",
            "acme/widget",
            "--skip-self-project",
            "--dest-root",
            ws.to_str().expect("utf8 path"),
        ],
    );

    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.trim(), format!("acme/widget {master}"));
}

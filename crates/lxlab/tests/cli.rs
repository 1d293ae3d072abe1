//! CLI smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

const DEFINITIONS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos/containers.yaml");

fn lxlab() -> Command {
    let mut cmd = Command::cargo_bin("lxlab").unwrap();
    cmd.env_remove("LXLAB_CONFIG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    lxlab()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn list_shows_containers() {
    lxlab()
        .args(["--config", DEFINITIONS, "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("H1"))
        .stdout(predicate::str::contains("11.1.2.141/24"))
        .stdout(predicate::str::contains("10,20"));
}

#[test]
fn list_missing_file_fails() {
    lxlab()
        .args(["--config", "/nonexistent/containers.yaml", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn render_writes_artifacts() {
    let temp = tempfile::tempdir().unwrap();

    lxlab()
        .args(["--config", DEFINITIONS, "render", "H2", "--out"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("container-init"));

    let zebra = std::fs::read_to_string(temp.path().join("etc/frr/zebra.conf")).unwrap();
    assert!(zebra.contains("interface eth1.20"));
}

#[test]
fn create_unknown_container_fails() {
    lxlab()
        .args(["--config", DEFINITIONS, "--dry-run", "create", "H9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Container 'H9' not found"));
}

#[test]
fn dry_run_create_prints_summary() {
    let temp = tempfile::tempdir().unwrap();

    lxlab()
        .args(["--config", DEFINITIONS, "--dry-run", "--root"])
        .arg(temp.path())
        .args(["create", "H2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Container 'H2' created successfully!"))
        .stderr(predicate::str::contains("[dry-run]"));
}

//! 命令行端到端测试（仅使用模拟秤）

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("tote-cli").unwrap();
    cmd.env("RUST_LOG", "off");
    cmd
}

fn simulated_config(dir: &tempfile::TempDir, initial_kg: f64) -> std::path::PathBuf {
    let path = dir.path().join("station.toml");
    fs::write(
        &path,
        format!("[sensor]\nkind = \"simulated\"\ninitial_kg = {}\n", initial_kg),
    )
    .unwrap();
    path
}

#[test]
fn test_config_init_writes_defaults_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("station.toml");

    cli()
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .success();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("[fill]"));

    cli()
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    cli()
        .args(["config", "init", "--force", "--path"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn test_config_check_reports_bad_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[timing]\ntick_interval_ms = 0\n").unwrap();

    cli()
        .arg("--config")
        .arg(&path)
        .args(["config", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tick_interval_ms"));
}

#[test]
fn test_config_show_prints_effective_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("station.toml");
    fs::write(&path, "[fill]\ntarget_ice_kg = 3.5\n").unwrap();

    cli()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("target_ice_kg = 3.5"))
        .stdout(predicate::str::contains("target_water_kg = 2.0"));
}

#[test]
fn test_weigh_reads_simulated_scale() {
    let dir = tempfile::tempdir().unwrap();
    let path = simulated_config(&dir, 12.5);

    cli()
        .arg("--config")
        .arg(&path)
        .arg("weigh")
        .assert()
        .success()
        .stdout(predicate::str::contains("12.50 kg"));
}

#[test]
fn test_weigh_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = simulated_config(&dir, 8.0);

    let output = cli()
        .arg("--config")
        .arg(&path)
        .args(["weigh", "--json", "--detail"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let line = String::from_utf8(output.stdout).unwrap();
    let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(value["gross_kg"], 8.0);
    assert_eq!(value["stable"], true);
}

#[test]
fn test_tare_on_simulated_scale() {
    let dir = tempfile::tempdir().unwrap();
    let path = simulated_config(&dir, 4.0);

    cli()
        .arg("--config")
        .arg(&path)
        .arg("tare")
        .assert()
        .success()
        .stdout(predicate::str::contains("tare set to 4.00 kg"));
}

#[test]
fn test_simulated_run_stops_after_max_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let path = simulated_config(&dir, 0.0);

    cli()
        .arg("--config")
        .arg(&path)
        .args(["run", "--simulate", "--no-console", "--max-ticks", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("IDLE"));
}

//! Integration tests for the settings commands: get, set, list, reset,
//! export, import, and config resolution.

mod common;

use common::{TestEnv, parse_json};
use predicates::prelude::*;
use serde_json::json;

const CONFIG: &str = r#"
namespace = "camera"

[defaults]
speed = 1.0
"rotation/enabled" = true
"#;

#[test]
fn test_resolve_qualifies_bare_keys() {
    let env = TestEnv::new();
    let output = env
        .sbr()
        .args(["resolve", "speed", "-n", "camera"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["qualified"], "camera/speed");

    env.sbr()
        .args(["-H", "-n", "camera", "resolve", "other/speed"])
        .assert()
        .success()
        .stdout("other/speed\n");
}

#[test]
fn test_get_falls_back_to_registered_default() {
    let env = TestEnv::with_config(CONFIG);
    let output = env.sbr().args(["get", "speed"]).output().unwrap();
    assert!(output.status.success());

    let json = parse_json(&output.stdout);
    assert_eq!(json["key"], "camera/speed");
    assert_eq!(json["value"], json!(1.0));
    assert_eq!(json["registered"], true);
}

#[test]
fn test_get_unknown_key_uses_cli_default() {
    let env = TestEnv::new();
    env.sbr()
        .args(["-H", "get", "missing", "--default", "\"fallback\""])
        .assert()
        .success()
        .stdout("fallback\n");
}

#[test]
fn test_set_writes_store_and_reports_change() {
    let env = TestEnv::with_config(CONFIG);

    let output = env.sbr().args(["set", "speed", "2.5"]).output().unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["changed"], true);
    assert_eq!(json["previous"], json!(1.0));
    assert_eq!(env.stored()["camera/speed"], json!(2.5));

    let output = env.sbr().args(["set", "speed", "2.5"]).output().unwrap();
    assert_eq!(parse_json(&output.stdout)["changed"], false);
}

#[test]
fn test_set_non_json_value_is_stored_as_string() {
    let env = TestEnv::new();
    env.sbr()
        .args(["-n", "cam", "set", "label", "front door"])
        .assert()
        .success();
    assert_eq!(env.stored()["cam/label"], "front door");
}

#[test]
fn test_get_float_coerces_strings() {
    let env = TestEnv::new();
    env.sbr()
        .args(["-n", "cam", "set", "zoom", "\"1.5\""])
        .assert()
        .success();
    let output = env
        .sbr()
        .args(["-n", "cam", "get", "zoom", "--float"])
        .output()
        .unwrap();
    assert_eq!(parse_json(&output.stdout)["value"], json!(1.5));
}

#[test]
fn test_list_and_reset() {
    let env = TestEnv::with_config(CONFIG);
    env.sbr().args(["set", "speed", "9"]).assert().success();

    env.sbr()
        .args(["-H", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* camera/speed = 9"))
        .stdout(predicate::str::contains("  camera/rotation/enabled = true"));

    let output = env.sbr().arg("reset").output().unwrap();
    assert_eq!(parse_json(&output.stdout)["changed"], 1);
    assert_eq!(env.stored()["camera/speed"], json!(1.0));
}

#[test]
fn test_export_import_round_trip_skips_unregistered() {
    let env = TestEnv::with_config(CONFIG);
    env.sbr().args(["set", "speed", "3"]).assert().success();

    let snapshot_path = env.data_path().join("snapshot.json");
    env.sbr()
        .args(["export", "--name", "saved", "-o"])
        .arg(&snapshot_path)
        .assert()
        .success();

    let mut snapshot: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snapshot_path).unwrap()).unwrap();
    assert_eq!(snapshot["name"], "saved");
    assert_eq!(snapshot["settings"]["camera"]["speed"], json!(3));
    assert_eq!(snapshot["_metadata"]["namespace"], "camera");

    snapshot["settings"]["camera"]["speed"] = json!(4);
    snapshot["settings"]["camera"]["bogus"] = json!(1);
    std::fs::write(&snapshot_path, snapshot.to_string()).unwrap();

    let output = env.sbr().arg("import").arg(&snapshot_path).output().unwrap();
    assert!(output.status.success());
    let report = parse_json(&output.stdout);
    assert_eq!(report["applied"], json!(["camera/speed"]));
    assert_eq!(report["skipped"], json!(["camera/bogus"]));
    assert_eq!(env.stored()["camera/speed"], json!(4));
    assert!(env.stored().get("camera/bogus").is_none());
}

#[test]
fn test_config_show_reports_sources() {
    let env = TestEnv::with_config(CONFIG);
    let output = env
        .sbr()
        .args(["config", "show"])
        .env("SBR_NAMESPACE", "from-env")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = parse_json(&output.stdout);
    assert_eq!(json["namespace"]["value"], "from-env");
    assert_eq!(json["namespace"]["source"], "env:SBR_NAMESPACE");
    assert_eq!(json["store"]["source"], "env:SBR_STORE");
    assert_eq!(json["monitor_interval_ms"]["value"], 1000);
}

#[test]
fn test_invalid_config_is_reported_as_json_error() {
    let env = TestEnv::with_config("namespace = [");
    env.sbr()
        .args(["get", "speed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""))
        .stderr(predicate::str::contains("Config parse error"));
}

#[test]
fn test_qualified_namespace_flag_is_rejected() {
    let env = TestEnv::new();
    env.sbr()
        .args(["-H", "-n", "a/b", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error: Invalid input"));
}

//! Integration tests for the lambda-deploy CLI
//!
//! A shell script stands in for `ligo`, so these run on unix only.
#![cfg(unix)]
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

const FAKE_LIGO: &str = r#"#!/bin/sh
if [ "$1" = "--help" ]; then echo "ligo help"; exit 0; fi
if [ "$1" = "--version" ]; then echo "0.31.0"; exit 0; fi
echo "$@" >> "$(dirname "$0")/calls.log"
case "$1 $2" in
  "compile expression")
    case "$4" in
      *record*)
        idx=$(echo "$4" | sed -n 's/.*index=\([0-9]*\)n.*/\1/p')
        printf '{"prim":"Right","args":[{"prim":"Pair","args":[{"bytes":"05%02x"},{"int":"%s"}]}]}\n' "$idx" "$idx"
        ;;
      *) echo '{"bytes":"05aa"}' ;;
    esac
    ;;
  "compile contract")
    case "$*" in
      *json*) echo '[{"prim":"parameter","args":[{"prim":"unit"}]}]' ;;
      *) echo 'parameter unit;' ;;
    esac
    ;;
  *) echo "unknown command" >&2; exit 3 ;;
esac
"#;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        let ligo = root.join("ligo");
        fs::write(&ligo, FAKE_LIGO).unwrap();
        fs::set_permissions(&ligo, fs::Permissions::from_mode(0o755)).unwrap();

        fs::create_dir_all(root.join("contracts/main")).unwrap();
        fs::write(root.join("contracts/main/dex.ligo"), "function main() is ...").unwrap();
        fs::write(root.join("contracts/main/factory.ligo"), "function main() is ...").unwrap();

        fs::create_dir_all(root.join("contracts/compiled/lambdas")).unwrap();
        fs::write(
            root.join("contracts/compiled/lambdas/Dex_lambdas.json"),
            r#"[{ "index": 1, "name": "swap" }, { "index": 0, "name": "invest" }, { "index": 2, "name": "add_pool" }]"#,
        )
        .unwrap();

        fs::write(
            root.join("deploy.yaml"),
            format!(
                "ligo_local_path: {}\ndockerized_ligo: false\ndocker_path: /nonexistent/docker\noctez_client_path: /nonexistent/octez-client\n",
                ligo.display()
            ),
        )
        .unwrap();
        Self { dir }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("lambda-deploy").expect("binary not found");
        cmd.current_dir(self.dir.path())
            .env_remove("LIGO_VERSION")
            .env_remove("DOCKERIZED_LIGO")
            .env_remove("DEPLOY_NETWORK")
            .env_remove("DEPLOYER_SK")
            .env("RUST_LOG", "warn");
        cmd
    }

    fn read_json(&self, rel: &str) -> Value {
        serde_json::from_str(&fs::read_to_string(self.dir.path().join(rel)).unwrap()).unwrap()
    }
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("lambda-deploy")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("compile-lambda"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_compile_lambda_writes_ordered_table() {
    let project = Project::new();
    project
        .cmd()
        .args([
            "compile-lambda",
            "--type",
            "Dex",
            "--json",
            "contracts/compiled/lambdas/Dex_lambdas.json",
            "--contract",
            "contracts/main/dex.ligo",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 Dex lambdas"));

    let table = project.read_json("build/lambdas/Dex_lambdas.json");
    let entries = table.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry["args"][1]["int"], i.to_string());
        assert_eq!(entry["args"][0]["bytes"], format!("05{:02x}", i));
    }
}

#[test]
fn test_compile_lambda_against_factory_skips_excluded() {
    let project = Project::new();
    project
        .cmd()
        .args([
            "--json-output",
            "compile-lambda",
            "-t",
            "dex",
            "-j",
            "contracts/compiled/lambdas/Dex_lambdas.json",
            "-c",
            "contracts/main/factory.ligo",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"skipped\": 1"));

    let table = project.read_json("build/lambdas/factory/Dex_lambdas.json");
    assert_eq!(table.as_array().unwrap().len(), 2);
}

#[test]
fn test_unknown_lambda_type_is_rejected() {
    let project = Project::new();
    project
        .cmd()
        .args(["compile-lambda", "--type", "Pool", "--json", "x.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown lambda type"));
}

#[test]
fn test_compile_skips_unchanged_source() {
    let project = Project::new();
    let compile = |extra: &[&str]| {
        let mut cmd = project.cmd();
        cmd.args(["compile", "--contract", "contracts/main/dex.ligo"]).args(extra);
        cmd.assert().success()
    };

    compile(&[]).stdout(predicate::str::contains("compiled"));
    let artifact = project.read_json("build/dex.json");
    assert_eq!(artifact["contractName"], "dex");
    assert_eq!(artifact["sourcePath"], "contracts/main/dex.ligo");
    assert!(artifact["sourceHash"].is_string());

    compile(&[]).stdout(predicate::str::contains("up_to_date"));
    compile(&["--force"]).stdout(predicate::str::contains("compiled"));
}

#[test]
fn test_compile_tz_writes_michelson_text() {
    let project = Project::new();
    project
        .cmd()
        .args(["compile", "--contract", "contracts/main/dex.ligo", "--format", "tz"])
        .assert()
        .success();
    let text = fs::read_to_string(project.dir.path().join("contracts/compiled/dex.tz")).unwrap();
    assert_eq!(text.trim(), "parameter unit;");
}

#[test]
fn test_compile_factory_lambda_writes_hex() {
    let project = Project::new();
    project
        .cmd()
        .args(["compile-factory-lambda", "--name", "add_pool"])
        .assert()
        .success();
    let hex = fs::read_to_string(project.dir.path().join("build/lambdas/factory/add_pool.txt")).unwrap();
    assert_eq!(hex, "05aa");
}

#[test]
fn test_migrate_list_needs_no_network() {
    let project = Project::new();
    project
        .cmd()
        .args(["migrate", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("00_dex"))
        .stdout(predicate::str::contains("01_factory"));
}

#[test]
fn test_migrate_rejects_inverted_range() {
    let project = Project::new();
    project
        .cmd()
        .args(["migrate", "--from", "1", "--to", "0", "--key", "edsk-unused"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--from 1 is after --to 0"));
}

#[test]
fn test_migrate_requires_a_key() {
    let project = Project::new();
    project
        .cmd()
        .args(["--debug-json", "migrate", "--network", "sandbox"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no deployer key"));
}

#[test]
fn test_doctor_json_report() {
    let project = Project::new();
    let assert = project
        .cmd()
        .env("LAMBDA_DEPLOY_RPC_SANDBOX", "http://127.0.0.1:1")
        .args(["--json-output", "doctor", "--timeout-secs", "2"])
        .assert()
        .failure();

    let report: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["ok"], false);
    let status = |id: &str| {
        report["checks"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["id"] == id)
            .map(|c| c["status"].clone())
            .unwrap()
    };
    assert_eq!(status("ligo_docker"), "warn");
    assert_eq!(status("octez_client"), "fail");
    assert_eq!(status("rpc_reachability"), "fail");
    assert_eq!(status("output_directory"), "pass");
}

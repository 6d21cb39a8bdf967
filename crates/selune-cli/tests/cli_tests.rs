//! End-to-end tests for the `selune` binary

use assert_cmd::Command;
use predicates::prelude::*;
use selune_compiler::Program;
use std::fs;

fn selune() -> Command {
    Command::cargo_bin("selune").expect("binary not built")
}

fn write_source(dir: &tempfile::TempDir, name: &str, source: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, source).expect("failed to write source");
    path.to_str().unwrap().to_string()
}

#[test]
fn test_build_writes_loadable_program() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_source(&dir, "hello.sel", "local greeting = \"hi\"\nprint(greeting)\n");

    selune()
        .args(["build", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiled"));

    let output = dir.path().join("hello.slb");
    let bytes = fs::read(output).expect("missing .slb output");
    let program = Program::from_bytes(&bytes).expect("output is not a valid program");
    assert_eq!(program.entry().name, "$main");
}

#[test]
fn test_build_disasm_prints_dump() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_source(&dir, "x.sel", "local x = 1\n");

    selune()
        .args(["build", &file, "--disasm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("function $main(0, ...) [0]"))
        .stdout(predicate::str::contains("push_int"));
}

#[test]
fn test_build_respects_output_flag() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_source(&dir, "x.sel", "local x = 1\n");
    let out = dir.path().join("custom.bin");

    selune()
        .args(["build", &file, "-o", out.to_str().unwrap()])
        .assert()
        .success();
    assert!(out.exists());
}

#[test]
fn test_check_reports_error_with_location() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_source(&dir, "bad.sel", "local x = 1\nbreak\n");

    selune()
        .args(["check", &file])
        .assert()
        .failure()
        .stderr(predicate::str::contains(format!("{}:2:", file)))
        .stderr(predicate::str::contains("break outside of a loop"));
}

#[test]
fn test_check_accepts_valid_source() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_source(&dir, "ok.sel", "for i = 1, 3 do print(i) end\n");

    selune()
        .args(["check", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn test_dump_prints_tables() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_source(&dir, "d.sel", "x = 1\n");

    selune()
        .args(["dump", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("consts(1):"))
        .stdout(predicate::str::contains("upvalues(1):"));
}

#[test]
fn test_dump_json_is_parseable() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_source(&dir, "j.sel", "local x = 1\n");

    let output = selune().args(["dump", &file, "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(value["prototypes"].is_array());
}

#[test]
fn test_missing_file_fails() {
    selune()
        .args(["check", "no-such-file.sel"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

use assert_cmd::prelude::*;
use predicates::str::contains;
use std::process::Command;

#[test]
fn generate_empty_description_fails_fast() {
    let mut cmd = Command::cargo_bin("fixi").unwrap();
    cmd.args(["generate", "--provider", "mock", ""]);
    cmd.assert()
        .success()
        .stdout(contains("Invalid input: Text description must be a non-empty string"));
}

#[test]
fn generate_extracts_code_from_fences() {
    let mut cmd = Command::cargo_bin("fixi").unwrap();
    cmd.args(["generate", "--provider", "mock", "a", "hello", "world", "program"]);
    cmd.env("FIXI_MOCK_RESPONSE", "Sure thing:\n```python\nprint('hello world')\n```");
    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("print('hello world')"));
    assert!(!stdout.contains("Sure thing"));
}

#[test]
fn generate_unfenced_output_passes_through_trimmed() {
    let mut cmd = Command::cargo_bin("fixi").unwrap();
    cmd.args(["generate", "--provider", "mock", "a", "one", "liner"]);
    cmd.env("FIXI_MOCK_RESPONSE", "  x = 1  ");
    cmd.assert().success().stdout(contains("x = 1"));
}

#[test]
fn convert_strips_language_echo_and_headers() {
    let mut cmd = Command::cargo_bin("fixi").unwrap();
    cmd.args(["convert", "--provider", "mock", "--from", "Python", "--to", "Rust", "print('hi')"]);
    cmd.env("FIXI_MOCK_RESPONSE", "rust\n# Converted code\nfn main() { println!(\"hi\"); }");
    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("fn main() { println!(\"hi\"); }"));
    assert!(!stdout.contains("Converted code"));
    assert!(!stdout.to_lowercase().contains("rust\n"));
}

#[test]
fn assist_answers_with_question_context() {
    let mut cmd = Command::cargo_bin("fixi").unwrap();
    cmd.args([
        "assist",
        "--provider",
        "mock",
        "--question",
        "why does this loop forever?",
        "while True: pass",
    ]);
    cmd.env("FIXI_MOCK_RESPONSE", "The condition never becomes false.");
    cmd.assert().success().stdout(contains("never becomes false"));
}

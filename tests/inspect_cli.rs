//! End-to-end checks of the `inspect` subcommand binary.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::process::Command;

fn recast() -> Command {
    Command::new(env!("CARGO_BIN_EXE_recast"))
}

fn video_identifier() -> String {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&4u32.to_le_bytes());
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&1000u64.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.extend_from_slice(&777u64.to_le_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

#[test]
fn test_inspect_prints_analysis() {
    let output = recast()
        .args(["inspect", &video_identifier()])
        .output()
        .expect("Failed to run recast");

    assert!(output.status.success(), "Command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("File type: video (4)"));
    assert!(stdout.contains("document locator (id=1000, access_hash=777)"));
}

#[test]
fn test_inspect_json() {
    let output = recast()
        .args(["inspect", "not-base64!!", "--json"])
        .output()
        .expect("Failed to run recast");

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["analysis"]["status"], "invalid");
}

#[test]
fn test_version() {
    let output = recast().arg("version").output().expect("Failed to run recast");
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("Recast "));
}

//! CLI integration tests for the provenance binary.
//!
//! These tests run the actual binary and check outputs, exit codes and
//! file artifacts. Network-facing commands run against mocks or a local
//! wiremock server.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use chrono::Utc;
use predicates::prelude::*;
use provenance_core::{Cid, ContentHash, Identity, ManifestBuilder, OwnerKey, PlatformProof};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMPTY_SHA3: &str = "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a";
const K1_HEX: &str = "1111111111111111111111111111111111111111111111111111111111111111";
const K2_HEX: &str = "2222222222222222222222222222222222222222222222222222222222222222";
const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Get a Command for the provenance binary with pipeline settings cleared.
fn provenance() -> Command {
    let mut cmd = Command::cargo_bin("provenance").unwrap();
    for key in [
        "UPLOAD_PROVIDERS",
        "IPFS_GATEWAY_URL",
        "REGISTRY_RPC_URL",
        "YOUTUBE_API_KEY",
        "VIMEO_ACCESS_TOKEN",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn write_key(dir: &Path, name: &str, hex: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, hex).unwrap();
    path
}

fn k1() -> OwnerKey {
    OwnerKey::from_hex(K1_HEX).unwrap()
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    provenance()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("manifest"))
        .stdout(predicate::str::contains("anchor"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn test_help_shows_exit_codes() {
    provenance()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("65"))
        .stdout(predicate::str::contains("69"));
}

#[test]
fn test_version_displays_version() {
    provenance()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("provenance"));
}

#[test]
fn test_unknown_flag_is_usage_error() {
    provenance().args(["hash", "--bogus"]).assert().code(64);
}

#[test]
fn test_verbose_conflicts_with_quiet() {
    provenance()
        .args(["-v", "-q", "hash", "x"])
        .assert()
        .code(64)
        .stderr(predicate::str::contains("cannot be used with"));
}

// ============================================================================
// Hash Command Tests
// ============================================================================

#[test]
fn test_hash_of_empty_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("empty.bin");
    fs::write(&file, b"").unwrap();

    provenance()
        .arg("hash")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(EMPTY_SHA3));
}

#[test]
fn test_hash_json_output() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("empty.bin");
    fs::write(&file, b"").unwrap();

    let output = provenance()
        .args(["--format", "json", "hash"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["content_hash"], EMPTY_SHA3);
}

#[test]
fn test_missing_file_is_input_error() {
    provenance()
        .args(["hash", "does/not/exist.bin"])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read file"));
}

// ============================================================================
// Upload Command Tests
// ============================================================================

#[test]
fn test_upload_with_mock_provider() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("video.mp4");
    fs::write(&file, b"frames").unwrap();

    provenance()
        .args(["--color", "never", "upload", "--mock"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("bafymock"))
        .stdout(predicate::str::contains("ipfs://"));
}

#[test]
fn test_upload_quiet_prints_nothing() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("video.mp4");
    fs::write(&file, b"frames").unwrap();

    provenance()
        .args(["-q", "upload", "--mock"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_upload_without_providers_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("video.mp4");
    fs::write(&file, b"frames").unwrap();

    provenance()
        .arg("upload")
        .arg(&file)
        .assert()
        .code(69)
        .stderr(predicate::str::contains("Upload failed"));
}

#[test]
fn test_color_never_has_no_ansi() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("video.mp4");
    fs::write(&file, b"frames").unwrap();

    provenance()
        .args(["--color", "never", "upload", "--mock"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\x1b[").not());
}

// ============================================================================
// Manifest and Anchor Command Tests
// ============================================================================

#[test]
fn test_manifest_then_anchor_with_mock_registry() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("video.mp4");
    fs::write(&file, b"frames").unwrap();
    let key = write_key(dir.path(), "owner.key", K1_HEX);
    let identity = format!("did:ethr:{}", k1().address());

    provenance()
        .args(["--color", "never", "manifest"])
        .arg(&file)
        .args(["--cid", "bafytest123", "--identity", &identity, "--key-file"])
        .arg(&key)
        .assert()
        .success()
        .stdout(predicate::str::contains("Manifest created"))
        .stdout(predicate::str::contains(ContentHash::of(b"frames").to_hex()));

    let manifest_path = dir.path().join("video.mp4.manifest.json");
    assert!(manifest_path.exists());
    let document: serde_json::Value = serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
    assert_eq!(document["cid"], "bafytest123");
    assert!(document["signature"].is_string());
    assert_eq!(document["signer"], k1().address().to_string());

    provenance()
        .args(["--color", "never", "anchor", "--mock"])
        .arg(&manifest_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Manifest anchored"));
}

#[test]
fn test_manifest_rejects_bad_identity() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("video.mp4");
    fs::write(&file, b"frames").unwrap();

    provenance()
        .arg("manifest")
        .arg(&file)
        .args(["--cid", "bafytest123", "--identity", "alice"])
        .assert()
        .code(65);
}

#[test]
fn test_anchor_invalid_manifest_is_data_error() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("bad.manifest.json");
    fs::write(&manifest, br#"{"version": 99}"#).unwrap();

    provenance()
        .args(["anchor", "--mock"])
        .arg(&manifest)
        .assert()
        .code(65)
        .stderr(predicate::str::contains("Invalid manifest"));
}

#[test]
fn test_anchor_without_registry_config_fails() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("video.mp4");
    fs::write(&file, b"frames").unwrap();

    provenance()
        .arg("manifest")
        .arg(&file)
        .args(["--cid", "bafytest123", "--identity", "did:web:example.com"])
        .assert()
        .success();

    provenance()
        .arg("anchor")
        .arg(dir.path().join("video.mp4.manifest.json"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("REGISTRY_RPC_URL"));
}

// ============================================================================
// Sign-Proof and Verify Command Tests
// ============================================================================

#[test]
fn test_sign_proof_prints_proof_line() {
    let dir = TempDir::new().unwrap();
    let key = write_key(dir.path(), "owner.key", &format!("0x{K1_HEX}"));
    let hash = ContentHash::of(b"frames").to_hex();

    provenance()
        .args(["sign-proof", "--content-hash", &hash, "--timestamp", "1700000000", "--key-file"])
        .arg(&key)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!(
            "provenance-proof:v1:{hash}:1700000000:"
        )));
}

#[test]
fn test_sign_proof_rejects_bad_hash() {
    let dir = TempDir::new().unwrap();
    let key = write_key(dir.path(), "owner.key", K1_HEX);

    provenance()
        .args(["sign-proof", "--content-hash", "not-hex", "--key-file"])
        .arg(&key)
        .assert()
        .code(64);
}

/// Serve a K1-signed manifest for `content` at `/manifest.json`.
async fn serve_manifest(server: &MockServer, content: &[u8]) -> String {
    let key = k1();
    let manifest = ManifestBuilder::new(
        Cid::parse("bafytest123").unwrap(),
        ContentHash::of(content),
        Identity::parse(&format!("did:ethr:{}", key.address())).unwrap(),
    )
    .build()
    .sign(&key)
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest.to_json_pretty().unwrap()))
        .mount(server)
        .await;
    format!("{}/manifest.json", server.uri())
}

fn description_signed_by(dir: &Path, key_hex: &str, content: &[u8]) -> std::path::PathBuf {
    let key = OwnerKey::from_hex(key_hex).unwrap();
    let line = PlatformProof::create(ContentHash::of(content), Utc::now().timestamp(), &key)
        .unwrap()
        .to_line();
    let path = dir.join("description.txt");
    fs::write(&path, format!("My video.\n\n{line}\n")).unwrap();
    path
}

#[tokio::test(flavor = "multi_thread")]
async fn test_verify_accepts_owner_proof() {
    let server = MockServer::start().await;
    let manifest_uri = serve_manifest(&server, b"frames").await;
    let dir = TempDir::new().unwrap();
    let description = description_signed_by(dir.path(), K1_HEX, b"frames");

    provenance()
        .args(["--color", "never", "verify", VIDEO_URL, &manifest_uri, "--proof-file"])
        .arg(&description)
        .assert()
        .success()
        .stdout(predicate::str::contains("Proof verified"))
        .stdout(predicate::str::contains(k1().address().to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_verify_rejects_other_signer() {
    let server = MockServer::start().await;
    let manifest_uri = serve_manifest(&server, b"frames").await;
    let dir = TempDir::new().unwrap();
    let description = description_signed_by(dir.path(), K2_HEX, b"frames");

    provenance()
        .args(["--color", "never", "verify", VIDEO_URL, &manifest_uri, "--proof-file"])
        .arg(&description)
        .assert()
        .code(65)
        .stdout(predicate::str::contains("Proof rejected"))
        .stderr(predicate::str::contains("verification failed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_verify_json_reports_record() {
    let server = MockServer::start().await;
    let manifest_uri = serve_manifest(&server, b"frames").await;
    let dir = TempDir::new().unwrap();
    let description = description_signed_by(dir.path(), K1_HEX, b"frames");

    let output = provenance()
        .args(["--format", "json", "verify", VIDEO_URL, &manifest_uri, "--proof-file"])
        .arg(&description)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["record"]["platform"], "youtube");
    assert_eq!(value["record"]["external_id"], "dQw4w9WgXcQ");
    assert_eq!(value["record"]["outcome"]["status"], "verified");
}

#[test]
fn test_verify_unrecognized_url_is_usage_error() {
    provenance()
        .args(["verify", "https://example.com/video/1", "https://example.com/m.json"])
        .assert()
        .code(64);
}

// ============================================================================
// Resolve Command Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_resolve_through_ipfs_gateway() {
    let server = MockServer::start().await;
    let manifest = ManifestBuilder::new(
        Cid::parse("bafytest123").unwrap(),
        ContentHash::of(b"frames"),
        Identity::parse("did:web:example.com").unwrap(),
    )
    .build();
    Mock::given(method("GET"))
        .and(path("/ipfs/bafymanifest"))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest.to_json_pretty().unwrap()))
        .mount(&server)
        .await;

    provenance()
        .env("IPFS_GATEWAY_URL", format!("{}/ipfs/", server.uri()))
        .args(["--color", "never", "resolve", "ipfs://bafymanifest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Manifest valid"))
        .stdout(predicate::str::contains(manifest.manifest_hash().to_hex()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resolve_invalid_manifest_is_data_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bad.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"version": 1}"#))
        .mount(&server)
        .await;

    provenance()
        .args(["resolve", &format!("{}/bad.json", server.uri())])
        .assert()
        .code(65);
}

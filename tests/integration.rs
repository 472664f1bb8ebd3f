//! CLI integration tests: run the `connie` binary against a temporary
//! config using the in-memory index. Nothing here reaches the network; the
//! embedding endpoint points at a closed local port.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn connie_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_connie"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("docs");
    fs::create_dir_all(docs_dir.join("nested")).unwrap();
    fs::write(
        docs_dir.join("Owner Guide.txt"),
        "Owners register from the home page. Fill in the profile and submit documents.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("nested/artists.txt"),
        "Artists upload portfolio samples and apply to open briefs.",
    )
    .unwrap();
    fs::write(docs_dir.join("ignored.md"), "not matched by the include globs").unwrap();

    fs::write(
        root.join("conversations.csv"),
        "Context,Response\nx,It sounds heavy.\ny,Call the hotline.\nz,One breath at a time.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[index]
provider = "memory"
dimension = 8

[embedding]
base_url = "http://127.0.0.1:9"
max_retries = 0
timeout_secs = 2

[ingest]
docs_dir = "{root}/docs"
include_globs = ["**/*.txt"]
log_path = "{root}/data/ingest_log.json"
namespace_map_path = "{root}/data/namespace_map.json"
chunk_words = 6
overlap_words = 1
"#,
        root = root.display()
    );

    let config_path = config_dir.join("connie.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_connie(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = connie_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("OPENAI_API_KEY", "test-key")
        .env_remove("PINECONE_INDEX_HOST")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run connie binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_help_lists_commands() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_connie(&config_path, &["--help"]);
    assert!(success);
    for cmd in ["serve", "ingest", "ask", "namespaces", "inspect", "delete-namespace"] {
        assert!(stdout.contains(cmd), "missing {} in help:\n{}", cmd, stdout);
    }
}

#[test]
fn test_ingest_pdfs_dry_run() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_connie(&config_path, &["ingest", "pdfs", "--dry-run"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingest pdfs (dry-run)"));
    assert!(stdout.contains("files found: 2"));
    assert!(stdout.contains("indexed: 2"));
    assert!(stdout.contains("ok"));

    // dry runs leave no state behind
    assert!(!tmp.path().join("data/ingest_log.json").exists());
    assert!(!tmp.path().join("data/namespace_map.json").exists());
}

#[test]
fn test_ingest_failure_is_reported_not_fatal() {
    let (tmp, config_path) = setup_test_env();

    // embedding endpoint is unreachable: every file fails, the run still completes
    let (stdout, stderr, success) = run_connie(&config_path, &["ingest", "pdfs"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("failed: 2"));
    assert!(stdout.contains("ok"));

    // namespaces are assigned as soon as a hash is first seen
    let map = fs::read_to_string(tmp.path().join("data/namespace_map.json")).unwrap();
    assert!(map.contains("\"Owner_Guide\""));
    assert!(map.contains("\"artists\""));
}

#[test]
fn test_ingest_csv_dry_run() {
    let (tmp, config_path) = setup_test_env();
    let csv = tmp.path().join("conversations.csv");

    let (stdout, stderr, success) =
        run_connie(&config_path, &["ingest", "csv", csv.to_str().unwrap(), "--dry-run"]);
    assert!(success, "csv ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("chunks to upsert: 2"));
}

#[test]
fn test_namespaces_on_empty_index() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_connie(&config_path, &["namespaces"]);
    assert!(success, "namespaces failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Dimension:   8"));
    assert!(stdout.contains("Namespaces:  0"));
}

#[test]
fn test_inspect_empty_namespace() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_connie(&config_path, &["inspect", "artists", "--limit", "3"]);
    assert!(success);
    assert!(stdout.contains("no chunks found in namespace 'artists'"));
}

#[test]
fn test_delete_namespace_with_yes() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_connie(&config_path, &["delete-namespace", "artists", "--yes"]);
    assert!(success);
    assert!(stdout.contains("deleted namespace 'artists'"));
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[index]\nprovider = \"qdrant\"\n").unwrap();

    let (_, stderr, success) = run_connie(&bad, &["namespaces"]);
    assert!(!success);
    assert!(stderr.contains("Unknown index provider"));
}

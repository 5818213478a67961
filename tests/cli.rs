mod common;

use std::process::{Command, Output};

use booksync::Book;
use common::{booksync_bin, dead_addr, dune, emma, serve_http};

fn booksync(args: &[&str]) -> Output {
    Command::new(booksync_bin())
        .args(args)
        .env_remove("BOOKSYNC_REMOTE")
        .env_remove("BOOKSYNC_STORE")
        .env("NO_COLOR", "1")
        .output()
        .expect("run booksync")
}

#[test]
fn sync_fetches_and_persists_collection() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("books.json");
    let body = serde_json::to_string(&vec![emma(), dune()]).expect("encode books");
    let remote = serve_http("200 OK", body, 1);

    let output = booksync(&[
        "sync",
        "--remote",
        &remote,
        "--store",
        store.to_str().expect("utf-8 path"),
        "--json",
    ]);
    assert!(
        output.status.success(),
        "sync failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let printed: Vec<Book> = serde_json::from_slice(&output.stdout).expect("json on stdout");
    assert_eq!(printed, vec![emma(), dune()]);

    let saved: Vec<Book> =
        serde_json::from_str(&std::fs::read_to_string(&store).expect("store file")).expect("parse store");
    assert_eq!(saved, vec![emma(), dune()]);
}

#[test]
fn sync_with_unreachable_remote_keeps_store_and_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("books.json");
    std::fs::write(&store, serde_json::to_string(&vec![emma()]).expect("encode")).expect("seed store");

    let output = booksync(&[
        "sync",
        "--remote",
        &dead_addr(),
        "--store",
        store.to_str().expect("utf-8 path"),
    ]);
    assert!(!output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("books=1 ids=1"), "stdout: {stdout}");
    assert!(stderr.contains("refresh failed"), "stderr: {stderr}");
    assert!(stderr.contains("Fetching failed"), "stderr: {stderr}");

    let saved: Vec<Book> =
        serde_json::from_str(&std::fs::read_to_string(&store).expect("store file")).expect("parse store");
    assert_eq!(saved, vec![emma()]);
}

#[test]
fn sync_with_empty_remote_list_writes_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("books.json");
    let remote = serve_http("200 OK", "[]".to_string(), 1);

    let output = booksync(&["sync", "--remote", &remote, "--store", store.to_str().expect("utf-8 path")]);
    assert!(
        output.status.success(),
        "sync failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("books=0 ids="));
    assert!(!store.exists(), "empty list means no write");
}

#[test]
fn failure_cause_is_reported_even_with_logging_off() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("books.json");

    let output = booksync(&[
        "--log-level",
        "off",
        "sync",
        "--remote",
        &dead_addr(),
        "--store",
        store.to_str().expect("utf-8 path"),
    ]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: refresh failed: remote fetch failed"), "stderr: {stderr}");
    assert!(!stderr.contains("Fetching failed"), "stderr: {stderr}");
}

#[test]
fn unknown_log_format_is_rejected() {
    let output = booksync(&["--log-format", "yaml", "sync", "--remote", "http://127.0.0.1:1", "--store", "x.json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown log format"), "stderr: {stderr}");
}

#[test]
fn missing_remote_is_a_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("books.json");

    let output = booksync(&["sync", "--store", store.to_str().expect("utf-8 path")]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("remote URL"), "stderr: {stderr}");
}

#[test]
fn config_file_supplies_remote_and_store() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("books.json");
    let remote = serve_http("204 No Content", String::new(), 1);
    let config = temp.path().join("booksync.toml");
    std::fs::write(
        &config,
        format!(
            "remote_url = \"{remote}\"\nstore_path = {:?}\nlog_level = \"warn\"\n",
            store.to_str().expect("utf-8 path")
        ),
    )
    .expect("write config");

    let output = booksync(&["--config", config.to_str().expect("utf-8 path"), "sync"]);
    assert!(
        output.status.success(),
        "sync failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("books=0 ids="));
    assert!(!store.exists(), "no content means no write");
}

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tpuff_client::testing::{FakeServer, FakeTurbopuffer};

#[allow(deprecated)]
fn tpuff(server: &FakeServer) -> Command {
    let mut cmd = Command::cargo_bin("tpuff").expect("binary");
    cmd.env("TURBOPUFFER_API_KEY", "test-key")
        .env("TURBOPUFFER_BASE_URL", server.base_url())
        .env("TPUFF_EMBEDDING_MODE", "stub")
        .env_remove("TURBOPUFFER_REGION")
        .env_remove("DEBUG");
    cmd
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn docs_namespace() -> FakeTurbopuffer {
    FakeTurbopuffer::new()
        .namespace(
            "docs",
            json!({
                "schema": {"vector": "[3]f32", "title": {"type": "string", "full_text_search": true}},
                "updated_at": "2024-03-01T00:00:00Z"
            }),
        )
        .rows(
            "docs",
            vec![
                json!({"id": "a", "title": "hello world", "vector": [0.1, 0.2, 0.3]}),
                json!({"id": "b", "title": "draft", "vector": [0.4, 0.5, 0.6]}),
            ],
        )
}

#[test]
fn list_sorts_namespaces_by_last_update() {
    let server = FakeTurbopuffer::new()
        .namespace("older", json!({"updated_at": "2023-01-01T00:00:00Z", "approx_row_count": 5}))
        .namespace("newer", json!({"updated_at": "2024-06-01T00:00:00Z", "approx_row_count": 1200}))
        .spawn();

    let output = tpuff(&server).arg("list").output().unwrap();
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Found 2 namespace(s):"), "{stdout}");
    assert!(stdout.contains("1,200"));
    let newer = stdout.find("newer").unwrap();
    let older = stdout.find("older").unwrap();
    assert!(newer < older, "{stdout}");
}

#[test]
fn list_reports_empty_account() {
    let server = FakeTurbopuffer::new().spawn();
    tpuff(&server)
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::contains("No namespaces found"));
}

#[test]
fn list_rejects_all_regions_with_region() {
    let server = FakeTurbopuffer::new().spawn();
    tpuff(&server)
        .args(["list", "--all", "-r", "aws-us-east-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot use both --all and --region"));
    assert!(server.requests().is_empty());
}

#[test]
fn list_documents_uses_zero_vector() {
    let server = docs_namespace().spawn();
    let output = tpuff(&server)
        .args(["list", "-n", "docs", "-k", "5"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Using 3-dimensional zero vector for query"));
    assert!(stdout.contains("Found 2 document(s):"));
    assert!(stdout.contains("hello world"));

    let queries = server.requests_to("POST", "/v2/namespaces/docs/query");
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].body["rank_by"], json!(["vector", "ANN", [0.0, 0.0, 0.0]]));
    assert_eq!(queries[0].body["exclude_attributes"], json!(["vector"]));
    assert_eq!(queries[0].body["top_k"], json!(5));
}

#[test]
fn get_prints_document_or_fails() {
    let server = docs_namespace().spawn();
    tpuff(&server)
        .args(["get", "a", "-n", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"hello world\""));

    tpuff(&server)
        .args(["get", "missing", "-n", "docs"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Document not found"));
}

#[test]
fn search_needs_a_mode() {
    let server = docs_namespace().spawn();
    tpuff(&server)
        .args(["search", "hello", "-n", "docs"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Either --model or --fts must be specified"));
}

#[test]
fn full_text_search_ranks_by_bm25() {
    let server = docs_namespace().spawn();
    let output = tpuff(&server)
        .args(["search", "hello", "-n", "docs", "--fts", "title", "-k", "3"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Full-text search (BM25)"));
    assert!(stdout.contains("Score"));
    assert!(stdout.contains("Search completed in"));

    let query = &server.requests_to("POST", "/v2/namespaces/docs/query")[0];
    assert_eq!(query.body["rank_by"], json!(["title", "BM25", "hello"]));
    assert_eq!(query.body["exclude_attributes"], json!(["vector"]));
}

#[test]
fn vector_search_checks_dimensions() {
    let server = docs_namespace().spawn();
    let output = tpuff(&server)
        .env("TPUFF_STUB_DIMENSION", "3")
        .args(["search", "hello", "-n", "docs", "-m", "org/tiny-model"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Generated 3-dimensional embedding"));
    assert!(stdout.contains("Using distance metric: cosine_distance"));
    assert!(stdout.contains("Distance"));

    let query = &server.requests_to("POST", "/v2/namespaces/docs/query")[0];
    assert_eq!(query.body["rank_by"][0], json!("vector"));
    assert_eq!(query.body["rank_by"][1], json!("ANN"));
    assert_eq!(query.body["rank_by"][2].as_array().unwrap().len(), 3);

    tpuff(&server)
        .env("TPUFF_STUB_DIMENSION", "8")
        .args(["search", "hello", "-n", "docs", "-m", "org/tiny-model"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Dimension mismatch!"));
}

#[test]
fn delete_one_asks_first() {
    let server = docs_namespace().spawn();
    tpuff(&server)
        .args(["delete", "-n", "docs"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deletion cancelled."));
    assert_eq!(server.namespace_ids(), vec!["docs"]);

    tpuff(&server)
        .args(["rm", "-n", "docs"])
        .write_stdin("yes\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Namespace docs deleted successfully!"));
    assert!(server.namespace_ids().is_empty());
}

#[test]
fn delete_needs_exactly_one_target() {
    let server = FakeTurbopuffer::new().spawn();
    tpuff(&server)
        .arg("delete")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "You must specify either -n <namespace>, --all, or --prefix <prefix>",
        ));
    tpuff(&server)
        .args(["delete", "--all", "--prefix", "tmp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot use multiple deletion options together"));
}

#[test]
fn delete_prefix_matches_any_case() {
    let server = FakeTurbopuffer::new()
        .namespace("TMP-one", json!({}))
        .namespace("tmp-two", json!({}))
        .namespace("prod", json!({}))
        .spawn();

    let output = tpuff(&server)
        .args(["delete", "--prefix", "tmp"])
        .write_stdin("TMP\n")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Found 2 namespace(s) matching prefix \"tmp\":"));
    assert!(stdout.contains("Successfully deleted: 2"));
    assert_eq!(server.namespace_ids(), vec!["prod"]);
}

#[test]
fn delete_prefix_reports_partial_failure() {
    let server = FakeTurbopuffer::new()
        .namespace("tmp-a", json!({}))
        .namespace("tmp-b", json!({}))
        .fail_delete("tmp-b", 500)
        .spawn();

    let output = tpuff(&server)
        .args(["delete", "--prefix", "tmp-"])
        .write_stdin("tmp-\n")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("✓ Deleted: tmp-a"));
    assert!(stdout.contains("✗ Failed to delete: tmp-b"));
    assert!(stdout.contains("Failed: 1"));
    assert_eq!(server.namespace_ids(), vec!["tmp-b"]);
}

#[test]
fn delete_all_requires_passphrase() {
    let server = FakeTurbopuffer::new()
        .namespace("a", json!({}))
        .namespace("b", json!({}))
        .spawn();

    tpuff(&server)
        .args(["delete", "--all"])
        .write_stdin("y\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wise choice!"));
    assert_eq!(server.namespace_ids().len(), 2);

    tpuff(&server)
        .args(["delete", "--all"])
        .write_stdin("yolo\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Successfully deleted: 2"));
    assert!(server.namespace_ids().is_empty());
}

#[cfg(unix)]
#[test]
fn edit_upserts_changed_document() {
    let temp = tempfile::tempdir().unwrap();
    let script = temp.path().join("edit.sh");
    std::fs::write(&script, "#!/bin/sh\nsed -i.bak 's/draft/final/' \"$1\"\n").unwrap();

    let server = docs_namespace().spawn();
    tpuff(&server)
        .env("EDITOR", format!("sh {}", script.display()))
        .args(["edit", "b", "-n", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Document updated successfully"));

    let rows = server.rows_of("docs");
    let edited = rows.iter().find(|row| row["id"] == "b").unwrap();
    assert_eq!(edited["title"], Value::from("final"));
    assert_eq!(edited["vector"], json!([0.4, 0.5, 0.6]));
}

#[cfg(unix)]
#[test]
fn edit_without_changes_skips_upsert() {
    let server = docs_namespace().spawn();
    tpuff(&server)
        .env("EDITOR", "true")
        .args(["edit", "a", "-n", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes made. Skipping upsert."));
    assert!(server.requests_to("POST", "/v2/namespaces/docs").is_empty());
}

#[test]
fn missing_api_key_is_an_error() {
    let server = FakeTurbopuffer::new().spawn();
    tpuff(&server)
        .env_remove("TURBOPUFFER_API_KEY")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TURBOPUFFER_API_KEY"));
}

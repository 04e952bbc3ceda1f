use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use tempfile::tempdir;
use tpuff_schema::{
    resolve_targets, ApplyOptions, ApplyOutcome, BatchOptions, BatchOutcome, ConfirmPrompt,
    InMemoryStore, NamespaceStore, Schema, SchemaApplier, SummaryPhase, TargetSelector,
    TargetStatus, DEFAULT_CALL_TIMEOUT,
};

fn accept(_: &ConfirmPrompt) -> bool {
    true
}

#[tokio::test]
async fn file_declaration_rolls_out_to_prefix() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("schema.json");
    fs::write(
        &path,
        r#"{
            "content": {"type": "string", "full_text_search": true},
            "tag": "uint64",
            "vector": "[4]f32"
        }"#,
    )
    .unwrap();
    let desired = Schema::load_file(&path).unwrap();

    let store = InMemoryStore::new();
    store.create_namespace(
        "tenant-a",
        Schema::from_remote(
            json!({"content": {"full_text_search": true, "type": "string"}})
                .as_object()
                .unwrap(),
        ),
        12,
    );
    store.create_namespace("tenant-b", Schema::new(), 0);
    store.create_namespace("Tenant-c", Schema::new(), 0);
    store.create_namespace("other", Schema::new(), 0);

    let targets = resolve_targets(
        &store,
        &TargetSelector::Prefix("tenant-".to_string()),
        DEFAULT_CALL_TIMEOUT,
    )
    .await
    .unwrap();
    assert_eq!(targets, vec!["tenant-a", "tenant-b"]);

    let applier = SchemaApplier::new(&store);
    let options = BatchOptions {
        auto_confirm: true,
        ..BatchOptions::default()
    };
    let report = applier.apply_batch(&targets, &desired, &options, &accept).await;

    assert_eq!(report.outcome, BatchOutcome::Committed { applied: 2, failed: 0 });
    assert_eq!(report.plan.results[0].additions, 2);
    assert_eq!(report.plan.results[1].additions, 3);
    assert!(report
        .plan
        .results
        .iter()
        .all(|r| r.status(SummaryPhase::Final) == TargetStatus::Applied));
    assert_eq!(report.exit_code(), 0);

    // A rerun finds nothing to do.
    let again = applier.apply_batch(&targets, &desired, &options, &accept).await;
    assert_eq!(again.outcome, BatchOutcome::NoChanges);
    assert_eq!(store.writes().len(), 2);
}

#[tokio::test]
async fn copied_schema_can_be_reapplied_without_changes() {
    let store = InMemoryStore::new();
    let source = Schema::parse_declaration(r#"{"title": "string", "id2": "uuid"}"#).unwrap();
    store.create_namespace("src", source.clone(), 3);

    let applier = SchemaApplier::new(&store);
    let plan = applier.plan_copy("src", "dst").await.unwrap();
    applier.commit_copy(&plan, true, &accept).await;

    let report = applier
        .apply(
            "dst",
            &source,
            &ApplyOptions {
                auto_confirm: true,
                ..ApplyOptions::default()
            },
            &accept,
        )
        .await;
    assert_eq!(report.outcome, ApplyOutcome::NoChanges);
    assert_eq!(store.row_count("dst").await.unwrap(), Some(1));
}

#[test]
fn invalid_file_reports_all_problems() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(
        &path,
        r#"{"a": "text", "b": {"type": "string", "stemming": true}, "": "bool"}"#,
    )
    .unwrap();
    let err = Schema::load_file(&path).unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("invalid type 'text'"));
    assert!(rendered.contains("unknown key 'stemming'"));
    assert!(rendered.contains("Attribute name cannot be empty"));
}

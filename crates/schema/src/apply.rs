use std::time::Duration;

use crate::diff::{diff, SchemaDiff};
use crate::store::{timed, Confirm, ConfirmPrompt, NamespaceStore, DEFAULT_CALL_TIMEOUT, PLACEHOLDER_ROW_ID};
use crate::types::Schema;

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Show the diff, write nothing
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub auto_confirm: bool,
}

/// Result of planning one namespace
#[derive(Debug, Clone, PartialEq)]
pub struct SinglePlan {
    pub namespace: String,
    pub current: Option<Schema>,
    pub diff: SchemaDiff,
    /// Set when the fetch failed and the live schema was assumed absent
    pub fetch_error: Option<String>,
}

/// Terminal state of a single-namespace apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The declaration changes the type of a deployed attribute
    Blocked,
    NoChanges,
    DryRun,
    Aborted,
    Applied,
    Failed(String),
}

impl ApplyOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Blocked | Self::Failed(_) => 1,
            Self::NoChanges | Self::DryRun | Self::Aborted | Self::Applied => 0,
        }
    }
}

/// Plan plus outcome, for callers that run both steps at once
#[derive(Debug, Clone, PartialEq)]
pub struct SingleApplyReport {
    pub plan: SinglePlan,
    pub outcome: ApplyOutcome,
}

/// Reconciles a desired schema against live namespaces through a
/// [`NamespaceStore`].
pub struct SchemaApplier<'a> {
    store: &'a dyn NamespaceStore,
    call_timeout: Duration,
}

impl<'a> SchemaApplier<'a> {
    pub fn new(store: &'a dyn NamespaceStore) -> Self {
        Self {
            store,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn store(&self) -> &'a dyn NamespaceStore {
        self.store
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Fetch the live schema and diff it. A failed fetch is planned as an
    /// absent schema.
    pub async fn plan(&self, namespace: &str, desired: &Schema) -> SinglePlan {
        let fetched = timed(
            "fetch schema",
            namespace,
            self.call_timeout,
            self.store.fetch_schema(namespace),
        )
        .await;

        let (current, fetch_error) = match fetched {
            Ok(current) => (current, None),
            Err(err) => {
                log::warn!("Treating '{namespace}' as having no schema: {err}");
                (None, Some(err.to_string()))
            }
        };

        SinglePlan {
            namespace: namespace.to_string(),
            diff: diff(current.as_ref(), desired),
            current,
            fetch_error,
        }
    }

    /// Walk a plan through the gates and write if everything allows it
    pub async fn commit(
        &self,
        plan: &SinglePlan,
        desired: &Schema,
        options: &ApplyOptions,
        confirm: &dyn Confirm,
    ) -> ApplyOutcome {
        if plan.diff.has_conflicts() {
            return ApplyOutcome::Blocked;
        }
        if !plan.diff.has_changes() {
            return ApplyOutcome::NoChanges;
        }
        if options.dry_run {
            return ApplyOutcome::DryRun;
        }
        if !options.auto_confirm
            && !confirm.confirm(&ConfirmPrompt::ApplySingle {
                namespace: plan.namespace.clone(),
            })
        {
            return ApplyOutcome::Aborted;
        }

        match self.write(&plan.namespace, desired).await {
            Ok(()) => ApplyOutcome::Applied,
            Err(message) => ApplyOutcome::Failed(message),
        }
    }

    /// Plan and commit in one go
    pub async fn apply(
        &self,
        namespace: &str,
        desired: &Schema,
        options: &ApplyOptions,
        confirm: &dyn Confirm,
    ) -> SingleApplyReport {
        let plan = self.plan(namespace, desired).await;
        let outcome = self.commit(&plan, desired, options, confirm).await;
        SingleApplyReport { plan, outcome }
    }

    pub(crate) async fn write(&self, namespace: &str, schema: &Schema) -> Result<(), String> {
        log::debug!("Writing {} attribute(s) to '{namespace}'", schema.len());
        timed(
            "write schema",
            namespace,
            self.call_timeout,
            self.store.write_schema(namespace, schema, PLACEHOLDER_ROW_ID),
        )
        .await
        .map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schema(value: serde_json::Value) -> Schema {
        Schema::from_declaration(&value).unwrap()
    }

    struct Scripted {
        answer: bool,
        asked: AtomicUsize,
    }

    impl Scripted {
        fn new(answer: bool) -> Self {
            Self {
                answer,
                asked: AtomicUsize::new(0),
            }
        }

        fn asked(&self) -> usize {
            self.asked.load(Ordering::SeqCst)
        }
    }

    impl Confirm for Scripted {
        fn confirm(&self, _prompt: &ConfirmPrompt) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn yes() -> ApplyOptions {
        ApplyOptions {
            auto_confirm: true,
            ..ApplyOptions::default()
        }
    }

    #[tokio::test]
    async fn additions_are_written_with_placeholder_row() {
        let store = InMemoryStore::new();
        store.create_namespace("docs", schema(json!({"content": "string"})), 5);
        let desired = schema(json!({"content": "string", "tag": "uint64"}));

        let report = SchemaApplier::new(&store)
            .apply("docs", &desired, &yes(), &Scripted::new(false))
            .await;

        assert_eq!(report.outcome, ApplyOutcome::Applied);
        assert_eq!(store.writes(), vec!["docs"]);
        assert_eq!(store.schema_of("docs"), Some(desired));
        assert_eq!(store.row_count("docs").await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn conflicts_block_regardless_of_confirmation() {
        let store = InMemoryStore::new();
        store.create_namespace("docs", schema(json!({"content": "string"})), 1);
        let desired = schema(json!({"content": "uint64"}));

        for confirm in [Scripted::new(true), Scripted::new(false)] {
            let report = SchemaApplier::new(&store)
                .apply("docs", &desired, &yes(), &confirm)
                .await;
            assert_eq!(report.outcome, ApplyOutcome::Blocked);
            assert_eq!(report.outcome.exit_code(), 1);
            assert_eq!(confirm.asked(), 0);
        }
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn up_to_date_schema_is_a_no_op() {
        let store = InMemoryStore::new();
        store.create_namespace("docs", schema(json!({"content": "string"})), 1);
        let report = SchemaApplier::new(&store)
            .apply("docs", &schema(json!({"content": "string"})), &yes(), &Scripted::new(true))
            .await;
        assert_eq!(report.outcome, ApplyOutcome::NoChanges);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let store = InMemoryStore::new();
        let options = ApplyOptions {
            dry_run: true,
            ..yes()
        };
        let report = SchemaApplier::new(&store)
            .apply("new-ns", &schema(json!({"a": "bool"})), &options, &Scripted::new(true))
            .await;
        assert_eq!(report.outcome, ApplyOutcome::DryRun);
        assert_eq!(report.plan.diff.additions.len(), 1);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn declined_confirmation_aborts() {
        let store = InMemoryStore::new();
        let confirm = Scripted::new(false);
        let report = SchemaApplier::new(&store)
            .apply("ns", &schema(json!({"a": "bool"})), &ApplyOptions::default(), &confirm)
            .await;
        assert_eq!(report.outcome, ApplyOutcome::Aborted);
        assert_eq!(report.outcome.exit_code(), 0);
        assert_eq!(confirm.asked(), 1);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn accepted_confirmation_writes() {
        let store = InMemoryStore::new();
        let confirm = Scripted::new(true);
        let report = SchemaApplier::new(&store)
            .apply("ns", &schema(json!({"a": "bool"})), &ApplyOptions::default(), &confirm)
            .await;
        assert_eq!(report.outcome, ApplyOutcome::Applied);
        assert_eq!(confirm.asked(), 1);
    }

    #[tokio::test]
    async fn write_failure_surfaces_message() {
        let store = InMemoryStore::new();
        store.fail_write("ns", "quota exceeded");
        let report = SchemaApplier::new(&store)
            .apply("ns", &schema(json!({"a": "bool"})), &yes(), &Scripted::new(true))
            .await;
        match &report.outcome {
            ApplyOutcome::Failed(message) => assert!(message.contains("quota exceeded")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(report.outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_is_planned_as_absent() {
        let store = InMemoryStore::new();
        store.create_namespace("ns", schema(json!({"a": "string"})), 1);
        store.fail_fetch("ns", "503 unavailable");
        let plan = SchemaApplier::new(&store)
            .plan("ns", &schema(json!({"a": "string"})))
            .await;
        assert_eq!(plan.current, None);
        assert!(plan.fetch_error.as_deref().unwrap_or("").contains("503"));
        assert_eq!(plan.diff.additions.len(), 1);
    }

    #[tokio::test]
    async fn second_apply_is_a_no_op() {
        let store = InMemoryStore::new();
        let desired = schema(json!({
            "content": {"type": "string", "full_text_search": true},
            "vector": "[3]f32"
        }));
        let applier = SchemaApplier::new(&store);
        let first = applier.apply("ns", &desired, &yes(), &Scripted::new(true)).await;
        let second = applier.apply("ns", &desired, &yes(), &Scripted::new(true)).await;
        assert_eq!(first.outcome, ApplyOutcome::Applied);
        assert_eq!(second.outcome, ApplyOutcome::NoChanges);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_write_times_out() {
        let store = InMemoryStore::new();
        let desired = schema(json!({"a": "bool"}));
        let applier = SchemaApplier::new(&store).with_call_timeout(Duration::from_secs(5));
        let plan = applier.plan("slow", &desired).await;
        store.hang("slow");
        let outcome = applier.commit(&plan, &desired, &yes(), &Scripted::new(true)).await;
        match outcome {
            ApplyOutcome::Failed(message) => assert!(message.contains("timed out after 5s")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

use futures::stream::{self, StreamExt};

use crate::apply::SchemaApplier;
use crate::diff::diff;
use crate::store::{timed, Confirm, ConfirmPrompt};
use crate::types::Schema;

/// Parallel fetches during planning
pub const DEFAULT_PLAN_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub dry_run: bool,
    pub auto_confirm: bool,
    /// Skip conflicted namespaces instead of blocking the whole batch
    pub continue_past_conflicts: bool,
    /// Planning fetches in flight at once
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            auto_confirm: false,
            continue_past_conflicts: false,
            concurrency: DEFAULT_PLAN_CONCURRENCY,
        }
    }
}

/// Per-namespace record, created during planning and updated once on commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchApplyResult {
    pub namespace: String,
    pub attempted: bool,
    pub succeeded: bool,
    pub additions: usize,
    pub conflicts: usize,
    pub error: Option<String>,
}

/// Whether a summary is printed before or after the commit phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryPhase {
    Preview,
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStatus {
    Blocked,
    /// Conflicted namespace left alone under continue-past-conflicts
    Skipped,
    Error(String),
    UpToDate,
    WouldSkip,
    WouldApply,
    Applied,
    Failed(String),
}

impl BatchApplyResult {
    fn planned(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Self::default()
        }
    }

    pub fn has_planning_error(&self) -> bool {
        self.error.is_some() && !self.attempted
    }

    /// Eligible for the commit phase
    pub fn needs_write(&self) -> bool {
        self.additions > 0 && self.conflicts == 0 && self.error.is_none()
    }

    pub fn write_failed(&self) -> bool {
        self.attempted && !self.succeeded
    }

    pub fn status(&self, phase: SummaryPhase) -> TargetStatus {
        if self.conflicts > 0 {
            return match phase {
                SummaryPhase::Preview => TargetStatus::Blocked,
                SummaryPhase::Final => TargetStatus::Skipped,
            };
        }
        if self.attempted {
            return if self.succeeded {
                TargetStatus::Applied
            } else {
                TargetStatus::Failed(self.error.clone().unwrap_or_default())
            };
        }
        if let Some(error) = &self.error {
            return TargetStatus::Error(error.clone());
        }
        match (self.additions, phase) {
            (0, SummaryPhase::Preview) => TargetStatus::WouldSkip,
            (0, SummaryPhase::Final) => TargetStatus::UpToDate,
            _ => TargetStatus::WouldApply,
        }
    }
}

/// Planning output for every target, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    pub results: Vec<BatchApplyResult>,
}

impl BatchPlan {
    pub fn has_conflicts(&self) -> bool {
        self.results.iter().any(|r| r.conflicts > 0)
    }

    pub fn has_changes(&self) -> bool {
        self.results.iter().any(|r| r.additions > 0 || r.conflicts > 0)
    }

    pub fn conflicted(&self) -> usize {
        self.results.iter().filter(|r| r.conflicts > 0).count()
    }

    pub fn to_write(&self) -> usize {
        self.results.iter().filter(|r| r.needs_write()).count()
    }

    pub fn planning_errors(&self) -> usize {
        self.results.iter().filter(|r| r.has_planning_error()).count()
    }

    pub fn applied(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.write_failed()).count()
    }
}

/// Where the batch stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// At least one namespace has conflicts and skipping them was not allowed
    Blocked,
    /// No namespace needs any change
    NoChanges,
    DryRun,
    /// Changes exist but none are writable (errors or skipped conflicts)
    NothingToWrite,
    Aborted,
    Committed { applied: usize, failed: usize },
}

/// Gate result plus the per-target records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub plan: BatchPlan,
    pub outcome: BatchOutcome,
}

impl BatchReport {
    /// 1 on a conflict block, a failed write or a planning error; a cancel or
    /// dry run is always 0.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            BatchOutcome::Blocked => 1,
            BatchOutcome::Aborted | BatchOutcome::DryRun => 0,
            BatchOutcome::NoChanges
            | BatchOutcome::NothingToWrite
            | BatchOutcome::Committed { .. } => {
                i32::from(self.plan.failed() > 0 || self.plan.planning_errors() > 0)
            }
        }
    }
}

impl SchemaApplier<'_> {
    /// Plan every target. Fetches run `concurrency` at a time and results
    /// keep input order. A namespace that does not exist is planned as all
    /// additions; any other fetch failure tags that target with an error.
    pub async fn plan_batch(
        &self,
        targets: &[String],
        desired: &Schema,
        concurrency: usize,
    ) -> BatchPlan {
        let store = self.store();
        let call_timeout = self.call_timeout();

        let results = stream::iter(targets)
            .map(|namespace| async move {
                let mut result = BatchApplyResult::planned(namespace);
                match timed(
                    "fetch schema",
                    namespace,
                    call_timeout,
                    store.fetch_schema(namespace),
                )
                .await
                {
                    Ok(current) => {
                        let planned = diff(current.as_ref(), desired);
                        result.additions = planned.additions.len();
                        result.conflicts = planned.conflicts.len();
                    }
                    Err(err) => {
                        log::warn!("Planning failed for '{namespace}': {err}");
                        result.error = Some(err.to_string());
                    }
                }
                result
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        BatchPlan { results }
    }

    /// Apply the decision gate to a plan and write every eligible target
    /// one after another. Failures stay with their target.
    pub async fn commit_batch(
        &self,
        plan: &mut BatchPlan,
        desired: &Schema,
        options: &BatchOptions,
        confirm: &dyn Confirm,
    ) -> BatchOutcome {
        if plan.has_conflicts() && !options.continue_past_conflicts {
            return BatchOutcome::Blocked;
        }
        if !plan.has_changes() {
            return BatchOutcome::NoChanges;
        }
        if options.dry_run {
            return BatchOutcome::DryRun;
        }

        let targets = plan.to_write();
        if targets == 0 {
            return BatchOutcome::NothingToWrite;
        }
        if !options.auto_confirm && !confirm.confirm(&ConfirmPrompt::ApplyBatch { targets }) {
            return BatchOutcome::Aborted;
        }

        for result in plan.results.iter_mut().filter(|r| r.needs_write()) {
            result.attempted = true;
            match self.write(&result.namespace, desired).await {
                Ok(()) => result.succeeded = true,
                Err(message) => {
                    log::warn!("Schema write failed for '{}': {message}", result.namespace);
                    result.error = Some(message);
                }
            }
        }

        BatchOutcome::Committed {
            applied: plan.applied(),
            failed: plan.failed(),
        }
    }

    /// Plan and commit in one go
    pub async fn apply_batch(
        &self,
        targets: &[String],
        desired: &Schema,
        options: &BatchOptions,
        confirm: &dyn Confirm,
    ) -> BatchReport {
        let mut plan = self.plan_batch(targets, desired, options.concurrency).await;
        let outcome = self.commit_batch(&mut plan, desired, options, confirm).await;
        BatchReport { plan, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::store::NamespaceStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn schema(value: serde_json::Value) -> Schema {
        Schema::from_declaration(&value).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<ConfirmPrompt>>,
        answer: bool,
    }

    impl Confirm for Recorder {
        fn confirm(&self, prompt: &ConfirmPrompt) -> bool {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.answer
        }
    }

    fn auto() -> BatchOptions {
        BatchOptions {
            auto_confirm: true,
            ..BatchOptions::default()
        }
    }

    fn scenario_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.create_namespace("ns-added", schema(json!({"content": "string"})), 3);
        store.create_namespace(
            "ns-current",
            schema(json!({"content": "string", "tag": "uint64"})),
            3,
        );
        store
    }

    #[tokio::test]
    async fn transient_fetch_failure_is_isolated_and_fails_exit() {
        let store = scenario_store();
        store.create_namespace("ns-broken", schema(json!({"content": "string"})), 3);
        store.fail_fetch("ns-broken", "connection reset");
        let desired = schema(json!({"content": "string", "tag": "uint64"}));

        let report = SchemaApplier::new(&store)
            .apply_batch(
                &names(&["ns-broken", "ns-added", "ns-current"]),
                &desired,
                &auto(),
                &Recorder::default(),
            )
            .await;

        assert_eq!(store.writes(), vec!["ns-added"]);
        let statuses: Vec<_> = report
            .plan
            .results
            .iter()
            .map(|r| (r.namespace.as_str(), r.status(SummaryPhase::Final)))
            .collect();
        assert_eq!(statuses[0].0, "ns-broken");
        assert!(matches!(&statuses[0].1, TargetStatus::Error(m) if m.contains("connection reset")));
        assert_eq!(statuses[1], ("ns-added", TargetStatus::Applied));
        assert_eq!(statuses[2], ("ns-current", TargetStatus::UpToDate));
        assert_eq!(report.outcome, BatchOutcome::Committed { applied: 1, failed: 0 });
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn missing_namespace_is_planned_as_additions() {
        let store = scenario_store();
        let desired = schema(json!({"content": "string", "tag": "uint64"}));

        let report = SchemaApplier::new(&store)
            .apply_batch(
                &names(&["ns-missing", "ns-added", "ns-current"]),
                &desired,
                &auto(),
                &Recorder::default(),
            )
            .await;

        assert_eq!(store.writes(), vec!["ns-missing", "ns-added"]);
        assert_eq!(report.plan.results[0].additions, 2);
        assert_eq!(
            report.plan.results[0].status(SummaryPhase::Final),
            TargetStatus::Applied
        );
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn any_conflict_blocks_the_batch() {
        let store = scenario_store();
        store.create_namespace("ns-conflict", schema(json!({"tag": "string"})), 1);
        let desired = schema(json!({"content": "string", "tag": "uint64"}));

        let report = SchemaApplier::new(&store)
            .apply_batch(
                &names(&["ns-added", "ns-conflict"]),
                &desired,
                &auto(),
                &Recorder::default(),
            )
            .await;

        assert_eq!(report.outcome, BatchOutcome::Blocked);
        assert_eq!(report.exit_code(), 1);
        assert!(store.writes().is_empty());
        assert_eq!(
            report.plan.results[1].status(SummaryPhase::Preview),
            TargetStatus::Blocked
        );
    }

    #[tokio::test]
    async fn continue_past_conflicts_skips_only_conflicted() {
        let store = scenario_store();
        store.create_namespace("ns-conflict", schema(json!({"tag": "string"})), 1);
        let desired = schema(json!({"content": "string", "tag": "uint64"}));
        let options = BatchOptions {
            continue_past_conflicts: true,
            ..auto()
        };

        let report = SchemaApplier::new(&store)
            .apply_batch(&names(&["ns-added", "ns-conflict"]), &desired, &options, &Recorder::default())
            .await;

        assert_eq!(store.writes(), vec!["ns-added"]);
        assert_eq!(report.outcome, BatchOutcome::Committed { applied: 1, failed: 0 });
        assert_eq!(
            report.plan.results[1].status(SummaryPhase::Final),
            TargetStatus::Skipped
        );
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn only_conflicts_left_means_nothing_to_write() {
        let store = InMemoryStore::new();
        store.create_namespace("ns-conflict", schema(json!({"tag": "string"})), 1);
        let options = BatchOptions {
            continue_past_conflicts: true,
            ..auto()
        };
        let report = SchemaApplier::new(&store)
            .apply_batch(&names(&["ns-conflict"]), &schema(json!({"tag": "uint64"})), &options, &Recorder::default())
            .await;
        assert_eq!(report.outcome, BatchOutcome::NothingToWrite);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn all_up_to_date_is_a_no_op() {
        let store = scenario_store();
        let report = SchemaApplier::new(&store)
            .apply_batch(
                &names(&["ns-added", "ns-current"]),
                &schema(json!({"content": "string"})),
                &auto(),
                &Recorder::default(),
            )
            .await;
        assert_eq!(report.outcome, BatchOutcome::NoChanges);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn dry_run_stops_after_summary() {
        let store = scenario_store();
        let options = BatchOptions {
            dry_run: true,
            ..auto()
        };
        let report = SchemaApplier::new(&store)
            .apply_batch(
                &names(&["ns-added", "ns-current"]),
                &schema(json!({"content": "string", "tag": "uint64"})),
                &options,
                &Recorder::default(),
            )
            .await;
        assert_eq!(report.outcome, BatchOutcome::DryRun);
        assert_eq!(
            report.plan.results[0].status(SummaryPhase::Preview),
            TargetStatus::WouldApply
        );
        assert_eq!(
            report.plan.results[1].status(SummaryPhase::Preview),
            TargetStatus::WouldSkip
        );
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn single_prompt_counts_only_writable_targets() {
        let store = scenario_store();
        let recorder = Recorder {
            answer: false,
            ..Recorder::default()
        };
        let report = SchemaApplier::new(&store)
            .apply_batch(
                &names(&["ns-added", "ns-current", "ns-new"]),
                &schema(json!({"content": "string", "tag": "uint64"})),
                &BatchOptions::default(),
                &recorder,
            )
            .await;
        assert_eq!(
            *recorder.prompts.lock().unwrap(),
            vec![ConfirmPrompt::ApplyBatch { targets: 2 }]
        );
        assert_eq!(report.outcome, BatchOutcome::Aborted);
        assert_eq!(report.exit_code(), 0);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn write_failure_does_not_stop_other_targets() {
        let store = InMemoryStore::new();
        store.fail_write("b", "rejected");
        let report = SchemaApplier::new(&store)
            .apply_batch(
                &names(&["a", "b", "c"]),
                &schema(json!({"x": "bool"})),
                &auto(),
                &Recorder::default(),
            )
            .await;
        assert_eq!(store.writes(), vec!["a", "b", "c"]);
        assert_eq!(report.outcome, BatchOutcome::Committed { applied: 2, failed: 1 });
        assert!(matches!(
            report.plan.results[1].status(SummaryPhase::Final),
            TargetStatus::Failed(m) if m.contains("rejected")
        ));
        assert_eq!(report.exit_code(), 1);
        assert!(store.fetch_schema("c").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_fetch_becomes_planning_error() {
        let store = scenario_store();
        store.hang("ns-slow");
        let report = SchemaApplier::new(&store)
            .with_call_timeout(Duration::from_secs(3))
            .apply_batch(
                &names(&["ns-slow", "ns-added"]),
                &schema(json!({"content": "string", "tag": "uint64"})),
                &auto(),
                &Recorder::default(),
            )
            .await;
        assert!(report.plan.results[0]
            .error
            .as_deref()
            .unwrap_or("")
            .contains("timed out"));
        assert_eq!(store.writes(), vec!["ns-added"]);
    }

    #[tokio::test]
    async fn plan_preserves_input_order_under_concurrency() {
        let store = InMemoryStore::new();
        let targets: Vec<String> = (0..25).rev().map(|i| format!("ns-{i:02}")).collect();
        let plan = SchemaApplier::new(&store)
            .plan_batch(&targets, &schema(json!({"a": "bool"})), 4)
            .await;
        let order: Vec<_> = plan.results.iter().map(|r| r.namespace.clone()).collect();
        assert_eq!(order, targets);
    }
}

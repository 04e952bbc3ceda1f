use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;
use crate::types::Schema;

/// Id of the synthetic row written alongside a schema. The service only
/// persists a schema when at least one row comes with it.
pub const PLACEHOLDER_ROW_ID: &str = "__schema_placeholder__";

/// Default bound for a single store call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Namespace operations the reconciliation engine needs from the service
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Live schema of a namespace. `Ok(None)` when the namespace does not
    /// exist or has no attributes yet.
    async fn fetch_schema(&self, namespace: &str) -> Result<Option<Schema>, StoreError>;

    /// Persist `schema` together with one placeholder row
    async fn write_schema(
        &self,
        namespace: &str,
        schema: &Schema,
        placeholder_id: &str,
    ) -> Result<(), StoreError>;

    /// Namespace ids, optionally narrowed server-side by prefix
    async fn list_namespaces(&self, prefix: Option<&str>) -> Result<Vec<String>, StoreError>;

    /// Approximate row count. `Ok(None)` when the namespace does not exist.
    async fn row_count(&self, namespace: &str) -> Result<Option<u64>, StoreError>;
}

/// Question put to the user before anything is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmPrompt {
    ApplySingle { namespace: String },
    ApplyBatch { targets: usize },
    Copy { source: String, target: String },
}

impl ConfirmPrompt {
    pub fn message(&self) -> String {
        match self {
            Self::ApplySingle { .. } => "Apply these schema changes?".to_string(),
            Self::ApplyBatch { targets } => format!("Apply schema to {targets} namespace(s)?"),
            Self::Copy { .. } => "Copy schema to target namespace?".to_string(),
        }
    }
}

/// Decides whether a pending write goes ahead
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &ConfirmPrompt) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&ConfirmPrompt) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &ConfirmPrompt) -> bool {
        self(prompt)
    }
}

/// Which namespaces a schema apply targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    Namespace(String),
    /// Case-sensitive prefix match
    Prefix(String),
    All,
}

/// Expand a selector into a sorted list of namespace ids
pub async fn resolve_targets(
    store: &dyn NamespaceStore,
    selector: &TargetSelector,
    call_timeout: Duration,
) -> Result<Vec<String>, StoreError> {
    let (prefix, label) = match selector {
        TargetSelector::Namespace(namespace) => return Ok(vec![namespace.clone()]),
        TargetSelector::Prefix(prefix) => (Some(prefix.as_str()), prefix.as_str()),
        TargetSelector::All => (None, "*"),
    };

    let mut namespaces = timed(
        "list namespaces",
        label,
        call_timeout,
        store.list_namespaces(prefix),
    )
    .await?;
    if let Some(prefix) = prefix {
        namespaces.retain(|ns| ns.starts_with(prefix));
    }
    namespaces.sort();
    namespaces.dedup();
    Ok(namespaces)
}

/// Run a store call under a deadline, mapping expiry to [`StoreError::Timeout`]
pub async fn timed<T, F>(
    operation: &'static str,
    namespace: &str,
    after: Duration,
    call: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation,
            namespace: namespace.to_string(),
            after,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn prefix_selection_is_case_sensitive_and_sorted() {
        let store = InMemoryStore::new();
        for ns in ["prod-b", "prod-a", "Prod-c", "staging"] {
            store.create_namespace(ns, crate::Schema::new(), 0);
        }
        let targets = resolve_targets(
            &store,
            &TargetSelector::Prefix("prod-".to_string()),
            DEFAULT_CALL_TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(targets, vec!["prod-a", "prod-b"]);
    }

    #[tokio::test]
    async fn all_selection_lists_everything() {
        let store = InMemoryStore::new();
        for ns in ["b", "a"] {
            store.create_namespace(ns, crate::Schema::new(), 0);
        }
        let targets = resolve_targets(&store, &TargetSelector::All, DEFAULT_CALL_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(targets, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn single_selection_skips_listing() {
        let store = InMemoryStore::new();
        store.fail_listing("boom");
        let targets = resolve_targets(
            &store,
            &TargetSelector::Namespace("x".to_string()),
            DEFAULT_CALL_TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(targets, vec!["x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_maps_expiry() {
        let err = timed::<(), _>("fetch schema", "ns", Duration::from_secs(2), async {
            std::future::pending::<Result<(), StoreError>>().await
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "fetch schema for 'ns' timed out after 2s");
    }

    #[test]
    fn prompt_messages() {
        assert_eq!(
            ConfirmPrompt::ApplyBatch { targets: 3 }.message(),
            "Apply schema to 3 namespace(s)?"
        );
        let always = |_: &ConfirmPrompt| true;
        assert!(always.confirm(&ConfirmPrompt::ApplySingle {
            namespace: "ns".to_string()
        }));
    }
}

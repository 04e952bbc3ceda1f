use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::store::NamespaceStore;
use crate::types::Schema;

#[derive(Debug, Default)]
struct NamespaceState {
    schema: Schema,
    rows: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Inner {
    namespaces: BTreeMap<String, NamespaceState>,
    fetch_failures: HashMap<String, String>,
    write_failures: HashMap<String, String>,
    hanging: HashSet<String>,
    listing_failure: Option<String>,
    writes: Vec<String>,
}

/// In-memory [`NamespaceStore`] for local runs and tests.
///
/// Failures can be injected per namespace; a "hanging" namespace never
/// answers, which is how callers exercise their timeouts.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create (or replace) a namespace with `rows` synthetic rows
    pub fn create_namespace(&self, namespace: &str, schema: Schema, rows: u64) {
        let state = NamespaceState {
            schema,
            rows: (0..rows).map(|idx| format!("row-{idx}")).collect(),
        };
        self.lock().namespaces.insert(namespace.to_string(), state);
    }

    /// Make every schema fetch for `namespace` fail
    pub fn fail_fetch(&self, namespace: &str, message: &str) {
        self.lock()
            .fetch_failures
            .insert(namespace.to_string(), message.to_string());
    }

    /// Make every write to `namespace` fail
    pub fn fail_write(&self, namespace: &str, message: &str) {
        self.lock()
            .write_failures
            .insert(namespace.to_string(), message.to_string());
    }

    pub fn fail_listing(&self, message: &str) {
        self.lock().listing_failure = Some(message.to_string());
    }

    /// Calls touching `namespace` never complete
    pub fn hang(&self, namespace: &str) {
        self.lock().hanging.insert(namespace.to_string());
    }

    /// Namespaces written so far, in call order
    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    pub fn schema_of(&self, namespace: &str) -> Option<Schema> {
        self.lock()
            .namespaces
            .get(namespace)
            .map(|state| state.schema.clone())
    }

    async fn stall_if_hanging(&self, namespace: &str) {
        let hanging = self.lock().hanging.contains(namespace);
        if hanging {
            std::future::pending::<()>().await;
        }
    }
}

fn rejected(operation: &'static str, namespace: &str, message: &str) -> StoreError {
    StoreError::Rejected {
        operation,
        namespace: namespace.to_string(),
        status: 500,
        message: message.to_string(),
    }
}

#[async_trait]
impl NamespaceStore for InMemoryStore {
    async fn fetch_schema(&self, namespace: &str) -> Result<Option<Schema>, StoreError> {
        self.stall_if_hanging(namespace).await;
        let inner = self.lock();
        if let Some(message) = inner.fetch_failures.get(namespace) {
            return Err(rejected("fetch schema", namespace, message));
        }
        Ok(inner
            .namespaces
            .get(namespace)
            .filter(|state| !state.schema.is_empty())
            .map(|state| state.schema.clone()))
    }

    async fn write_schema(
        &self,
        namespace: &str,
        schema: &Schema,
        placeholder_id: &str,
    ) -> Result<(), StoreError> {
        self.stall_if_hanging(namespace).await;
        let mut inner = self.lock();
        inner.writes.push(namespace.to_string());
        if let Some(message) = inner.write_failures.get(namespace) {
            return Err(rejected("write schema", namespace, message));
        }
        let state = inner.namespaces.entry(namespace.to_string()).or_default();
        for (name, ty) in schema.iter() {
            state.schema.insert(name, ty.clone());
        }
        state.rows.insert(placeholder_id.to_string());
        Ok(())
    }

    async fn list_namespaces(&self, prefix: Option<&str>) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        if let Some(message) = &inner.listing_failure {
            return Err(StoreError::other(message.clone()));
        }
        Ok(inner
            .namespaces
            .keys()
            .filter(|ns| prefix.map_or(true, |p| ns.starts_with(p)))
            .cloned()
            .collect())
    }

    async fn row_count(&self, namespace: &str) -> Result<Option<u64>, StoreError> {
        self.stall_if_hanging(namespace).await;
        let inner = self.lock();
        if let Some(message) = inner.fetch_failures.get(namespace) {
            return Err(rejected("row count", namespace, message));
        }
        Ok(inner
            .namespaces
            .get(namespace)
            .map(|state| state.rows.len() as u64))
    }
}

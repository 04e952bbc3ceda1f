use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tpuff_schema::{NamespaceStore, Schema, StoreError};

use crate::client::TurbopufferClient;
use crate::error::ClientError;
use crate::types::WriteRequest;

/// [`NamespaceStore`] backed by the turbopuffer REST API
#[derive(Debug, Clone)]
pub struct TurbopufferStore {
    client: Arc<TurbopufferClient>,
}

impl TurbopufferStore {
    pub fn new(client: Arc<TurbopufferClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &TurbopufferClient {
        &self.client
    }
}

fn store_error(operation: &'static str, namespace: &str, err: ClientError) -> StoreError {
    match err {
        ClientError::Api {
            status, message, ..
        } => StoreError::Rejected {
            operation,
            namespace: namespace.to_string(),
            status,
            message,
        },
        ClientError::Http { source, .. } => StoreError::Transport {
            operation,
            namespace: namespace.to_string(),
            message: source.to_string(),
        },
        other => StoreError::other(format!("{operation} failed for '{namespace}': {other}")),
    }
}

#[async_trait]
impl NamespaceStore for TurbopufferStore {
    async fn fetch_schema(&self, namespace: &str) -> Result<Option<Schema>, StoreError> {
        let metadata = self
            .client
            .metadata(namespace)
            .await
            .map_err(|err| store_error("fetch schema", namespace, err))?;
        Ok(metadata
            .filter(|metadata| !metadata.schema.is_empty())
            .map(|metadata| Schema::from_remote(&metadata.schema)))
    }

    async fn write_schema(
        &self,
        namespace: &str,
        schema: &Schema,
        placeholder_id: &str,
    ) -> Result<(), StoreError> {
        let write = WriteRequest {
            upsert_rows: vec![json!({ "id": placeholder_id })],
            schema: Some(schema.to_json()),
            ..WriteRequest::default()
        };
        self.client
            .write(namespace, &write)
            .await
            .map_err(|err| store_error("write schema", namespace, err))
    }

    async fn list_namespaces(&self, prefix: Option<&str>) -> Result<Vec<String>, StoreError> {
        self.client
            .list_namespaces(prefix)
            .await
            .map_err(|err| store_error("list namespaces", prefix.unwrap_or("*"), err))
    }

    async fn row_count(&self, namespace: &str) -> Result<Option<u64>, StoreError> {
        let metadata = self
            .client
            .metadata(namespace)
            .await
            .map_err(|err| store_error("read row count", namespace, err))?;
        Ok(metadata.map(|metadata| metadata.approx_row_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ClientCache;
    use crate::config::ClientConfig;
    use crate::testing::FakeTurbopuffer;
    use pretty_assertions::assert_eq;
    use tpuff_schema::{ApplyOptions, ApplyOutcome, ConfirmPrompt, SchemaApplier, PLACEHOLDER_ROW_ID};

    fn store_for(base_url: &str) -> TurbopufferStore {
        let cache = ClientCache::new(ClientConfig::new("test-key").with_base_url(base_url));
        TurbopufferStore::new(cache.client(None).unwrap())
    }

    #[tokio::test]
    async fn missing_or_empty_namespaces_have_no_schema() {
        let server = FakeTurbopuffer::new()
            .namespace("empty", json!({"approx_row_count": 0}))
            .namespace("docs", json!({"schema": {"title": {"type": "string"}}}))
            .spawn();
        let store = store_for(server.base_url());

        assert_eq!(store.fetch_schema("nope").await.unwrap(), None);
        assert_eq!(store.fetch_schema("empty").await.unwrap(), None);
        let docs = store.fetch_schema("docs").await.unwrap().unwrap();
        assert!(docs.contains("title"));
        assert_eq!(store.row_count("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_sends_schema_with_placeholder_row() {
        let server = FakeTurbopuffer::new().spawn();
        let store = store_for(server.base_url());
        let schema = Schema::parse_declaration(r#"{"tag": "uint64"}"#).unwrap();

        store
            .write_schema("fresh", &schema, PLACEHOLDER_ROW_ID)
            .await
            .unwrap();

        let writes = server.requests_to("POST", "/v2/namespaces/fresh");
        assert_eq!(
            writes[0].body,
            json!({"upsert_rows": [{"id": PLACEHOLDER_ROW_ID}], "schema": {"tag": "uint64"}})
        );
        assert_eq!(store.row_count("fresh").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn rejected_calls_keep_status_and_message() {
        let server = FakeTurbopuffer::new()
            .namespace("locked", json!({}))
            .fail_write("locked", 403)
            .fail_metadata("locked", 503)
            .spawn();
        let store = store_for(server.base_url());

        let err = store
            .write_schema("locked", &Schema::new(), PLACEHOLDER_ROW_ID)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Rejected {
                operation: "write schema",
                namespace: "locked".to_string(),
                status: 403,
                message: "write rejected".to_string(),
            }
        );
        assert!(matches!(
            store.fetch_schema("locked").await,
            Err(StoreError::Rejected { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let store = store_for("http://127.0.0.1:9");
        assert!(matches!(
            store.list_namespaces(None).await,
            Err(StoreError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn applier_runs_against_the_api() {
        let server = FakeTurbopuffer::new()
            .namespace("docs", json!({"schema": {"title": {"type": "string"}}}))
            .spawn();
        let store = store_for(server.base_url());
        let desired =
            Schema::parse_declaration(r#"{"title": "string", "year": "uint64"}"#).unwrap();
        let options = ApplyOptions {
            auto_confirm: true,
            ..ApplyOptions::default()
        };

        let report = SchemaApplier::new(&store)
            .apply("docs", &desired, &options, &|_: &ConfirmPrompt| true)
            .await;

        assert_eq!(report.outcome, ApplyOutcome::Applied);
        assert_eq!(
            server.schema_of("docs"),
            Some(json!({"title": "string", "year": "uint64"}))
        );
    }
}

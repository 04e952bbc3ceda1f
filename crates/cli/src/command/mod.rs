//! One module per subcommand. Handlers print their own output and return
//! the process exit code; unexpected failures bubble up as errors.

use std::process::ExitCode;

use anyhow::{Context, Result};
use tpuff_client::{ClientCache, ClientConfig, NamespaceMetadata, TurbopufferClient};
use tpuff_schema::Schema;

pub mod delete;
pub mod edit;
pub mod export;
pub mod get;
pub mod list;
pub mod schema;
pub mod search;

/// Clients for this invocation, configured from the environment
pub(crate) fn client_cache() -> Result<ClientCache> {
    Ok(ClientCache::new(ClientConfig::from_env()?))
}

/// Vector attribute of a namespace: name and dimension count
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VectorAttribute {
    pub name: String,
    pub dimensions: usize,
}

pub(crate) fn vector_attribute(metadata: &NamespaceMetadata) -> Option<VectorAttribute> {
    let schema = Schema::from_remote(&metadata.schema);
    schema.vector_attribute().map(|(name, vector)| VectorAttribute {
        name: name.to_string(),
        dimensions: vector.dimensions as usize,
    })
}

/// Metadata of a namespace that must exist
pub(crate) async fn require_metadata(
    client: &TurbopufferClient,
    namespace: &str,
) -> Result<NamespaceMetadata> {
    client
        .metadata(namespace)
        .await?
        .with_context(|| format!("Namespace '{namespace}' not found"))
}

pub(crate) fn exit_code(code: i32) -> ExitCode {
    if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn metadata(schema: serde_json::Value) -> NamespaceMetadata {
        serde_json::from_value(json!({ "schema": schema })).unwrap()
    }

    #[test]
    fn vector_attribute_found_in_any_declaration_shape() {
        let plain = metadata(json!({"title": "string", "embedding": "[384]f32"}));
        assert_eq!(
            vector_attribute(&plain),
            Some(VectorAttribute {
                name: "embedding".into(),
                dimensions: 384
            })
        );

        let annotated = metadata(json!({"vector": {"type": "[768]f16", "ann": true}}));
        assert_eq!(vector_attribute(&annotated).map(|v| v.dimensions), Some(768));

        assert_eq!(vector_attribute(&metadata(json!({"title": "string"}))), None);
    }
}

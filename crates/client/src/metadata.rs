use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::cache::ClientCache;
use crate::client::TurbopufferClient;
use crate::error::Result;
use crate::regions::REGIONS;
use crate::types::{NamespaceMetadata, RecallData};

/// Parallel metadata (and recall) fetches per region
pub const METADATA_CONCURRENCY: usize = 10;

/// Which regions a metadata sweep covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionScope {
    /// One region; `None` means the configured default
    Single(Option<String>),
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceWithMetadata {
    pub namespace_id: String,
    pub region: Option<String>,
    /// `None` when the metadata call failed
    pub metadata: Option<NamespaceMetadata>,
    pub recall: Option<RecallData>,
}

impl NamespaceWithMetadata {
    pub fn encryption_type(&self) -> &'static str {
        self.metadata
            .as_ref()
            .map_or("sse", NamespaceMetadata::encryption_type)
    }

    pub fn index_status(&self) -> &str {
        self.metadata
            .as_ref()
            .map_or("up-to-date", NamespaceMetadata::index_status)
    }

    pub fn unindexed_bytes(&self) -> u64 {
        self.metadata
            .as_ref()
            .map_or(0, NamespaceMetadata::unindexed_bytes)
    }
}

/// List namespaces and fetch their metadata.
///
/// Per-namespace failures become `None`. In [`RegionScope::All`] a region that
/// cannot be listed is logged and skipped; a single region propagates its
/// listing error.
pub async fn fetch_namespaces_with_metadata(
    cache: &ClientCache,
    scope: &RegionScope,
    include_recall: bool,
) -> Result<Vec<NamespaceWithMetadata>> {
    match scope {
        RegionScope::Single(region) => {
            let client = cache.client(region.as_deref())?;
            let label = cache.config().region_for(region.as_deref());
            fetch_region(client, Some(label), include_recall).await
        }
        RegionScope::All => {
            log::debug!("querying {} regions", REGIONS.len());
            let mut seen = HashSet::new();
            let mut all = Vec::new();
            for region in REGIONS {
                let client = cache.client(Some(region))?;
                if !seen.insert(client.base_url().to_string()) {
                    continue;
                }
                match fetch_region(client, Some(region.to_string()), include_recall).await {
                    Ok(found) => all.extend(found),
                    Err(err) => log::debug!("failed to query region {region}: {err}"),
                }
            }
            Ok(all)
        }
    }
}

async fn fetch_region(
    client: Arc<TurbopufferClient>,
    region: Option<String>,
    include_recall: bool,
) -> Result<Vec<NamespaceWithMetadata>> {
    let ids = client.list_namespaces(None).await?;
    log::debug!(
        "{} namespaces in {}",
        ids.len(),
        region.as_deref().unwrap_or("default region")
    );

    let results = stream::iter(ids)
        .map(|namespace_id| {
            let client = Arc::clone(&client);
            let region = region.clone();
            async move {
                let metadata = async {
                    match client.metadata(&namespace_id).await {
                        Ok(metadata) => metadata,
                        Err(err) => {
                            log::debug!("failed to fetch metadata for {namespace_id}: {err}");
                            None
                        }
                    }
                };
                let recall = async {
                    if !include_recall {
                        return None;
                    }
                    match client.recall(&namespace_id).await {
                        Ok(recall) => Some(recall),
                        Err(err) => {
                            log::debug!("failed to fetch recall for {namespace_id}: {err}");
                            None
                        }
                    }
                };
                let (metadata, recall) = futures::join!(metadata, recall);
                NamespaceWithMetadata {
                    namespace_id,
                    region,
                    metadata,
                    recall,
                }
            }
        })
        .buffered(METADATA_CONCURRENCY)
        .collect()
        .await;
    Ok(results)
}

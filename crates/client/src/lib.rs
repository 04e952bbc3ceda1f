//! # tpuff client
//!
//! Thin async client for the turbopuffer namespace API.
//!
//! ## Architecture
//!
//! ```text
//! ClientConfig (env) ──> ClientCache ──> TurbopufferClient (per endpoint)
//!                                           │
//!             ┌─────────────────────────────┼──────────────────────┐
//!             ▼                             ▼                      ▼
//!   fetch_namespaces_with_metadata    TurbopufferStore        query / write
//!   (bounded fan-out, per region)     (NamespaceStore)        delete / recall
//! ```
//!
//! Requests and responses are logged at debug level with long numeric
//! vectors elided.

mod cache;
mod client;
mod config;
mod debug;
mod error;
mod metadata;
mod regions;
mod store;
mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::ClientCache;
pub use client::TurbopufferClient;
pub use config::{ClientConfig, DEFAULT_TIMEOUT};
pub use debug::{debug_json, filter_vectors};
pub use error::{ClientError, Result};
pub use metadata::{
    fetch_namespaces_with_metadata, NamespaceWithMetadata, RegionScope, METADATA_CONCURRENCY,
};
pub use regions::{api_base_url, is_valid_region, DEFAULT_REGION, REGIONS};
pub use store::TurbopufferStore;
pub use types::{
    DistanceMetric, IndexInfo, NamespaceMetadata, QueryPerformance, QueryRequest, QueryResponse,
    RecallData, Row, WriteRequest,
};

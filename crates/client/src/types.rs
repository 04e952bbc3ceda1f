use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row as returned by a query: `id`, `$dist` and every attribute
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NamespaceListPage {
    #[serde(default)]
    pub namespaces: Vec<NamespaceSummary>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NamespaceSummary {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    #[serde(default = "up_to_date")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unindexed_bytes: Option<u64>,
}

fn up_to_date() -> String {
    "up-to-date".to_string()
}

/// `GET /v1/namespaces/{ns}/metadata`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceMetadata {
    #[serde(default)]
    pub approx_row_count: u64,
    #[serde(default)]
    pub approx_logical_bytes: u64,
    #[serde(default)]
    pub index: Option<IndexInfo>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub schema: Map<String, Value>,
    #[serde(default)]
    pub encryption: Option<Value>,
}

impl NamespaceMetadata {
    /// `cmek` when a customer-managed key is configured, `sse` otherwise
    pub fn encryption_type(&self) -> &'static str {
        match self.encryption.as_ref().and_then(|enc| enc.get("cmek")) {
            Some(cmek) if !cmek.is_null() && cmek != &Value::Bool(false) => "cmek",
            _ => "sse",
        }
    }

    pub fn index_status(&self) -> &str {
        self.index
            .as_ref()
            .map_or("up-to-date", |index| index.status.as_str())
    }

    /// Bytes not yet indexed; zero whenever the index is up to date
    pub fn unindexed_bytes(&self) -> u64 {
        match &self.index {
            Some(index) if index.status != "up-to-date" => index.unindexed_bytes.unwrap_or(0),
            _ => 0,
        }
    }
}

/// `POST /v1/namespaces/{ns}/_debug/recall`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecallData {
    pub avg_recall: f64,
    #[serde(default)]
    pub avg_ann_count: f64,
    #[serde(default)]
    pub avg_exhaustive_count: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct RecallRequest {
    pub num: u32,
    pub top_k: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    CosineDistance,
    EuclideanSquared,
}

impl DistanceMetric {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CosineDistance => "cosine_distance",
            Self::EuclideanSquared => "euclidean_squared",
        }
    }
}

/// `POST /v2/namespaces/{ns}/query`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_by: Option<Value>,
    pub top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_attributes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_metric: Option<DistanceMetric>,
}

impl QueryRequest {
    /// Nearest neighbours of `vector` on `attribute`
    pub fn ann(attribute: &str, vector: Vec<f32>, top_k: usize) -> Self {
        Self {
            rank_by: Some(Value::Array(vec![
                Value::String(attribute.to_string()),
                Value::String("ANN".to_string()),
                Value::from(vector),
            ])),
            top_k,
            ..Self::default()
        }
    }

    /// BM25 full-text ranking on `field`
    pub fn bm25(field: &str, text: &str, top_k: usize) -> Self {
        Self {
            rank_by: Some(Value::Array(vec![
                Value::String(field.to_string()),
                Value::String("BM25".to_string()),
                Value::String(text.to_string()),
            ])),
            top_k,
            ..Self::default()
        }
    }

    /// Exact lookup of one document with all attributes
    pub fn by_id(id: &str) -> Self {
        Self {
            filters: Some(Value::Array(vec![
                Value::String("id".to_string()),
                Value::String("Eq".to_string()),
                Value::String(id.to_string()),
            ])),
            top_k: 1,
            include_attributes: Some(Value::Bool(true)),
            ..Self::default()
        }
    }

    pub fn excluding(mut self, attribute: &str) -> Self {
        self.exclude_attributes
            .get_or_insert_with(Vec::new)
            .push(attribute.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct QueryPerformance {
    #[serde(default)]
    pub query_execution_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub performance: Option<QueryPerformance>,
}

/// `POST /v2/namespaces/{ns}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upsert_rows: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_metric: Option<DistanceMetric>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn metadata(value: Value) -> NamespaceMetadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn encryption_defaults_to_sse() {
        assert_eq!(metadata(json!({})).encryption_type(), "sse");
        assert_eq!(
            metadata(json!({"encryption": {"sse": true}})).encryption_type(),
            "sse"
        );
        assert_eq!(
            metadata(json!({"encryption": {"cmek": {"key_name": "k"}}})).encryption_type(),
            "cmek"
        );
    }

    #[test]
    fn unindexed_bytes_only_count_while_updating() {
        let idle = metadata(json!({"index": {"status": "up-to-date", "unindexed_bytes": 10}}));
        assert_eq!(idle.unindexed_bytes(), 0);
        let busy = metadata(json!({"index": {"status": "updating", "unindexed_bytes": 2048}}));
        assert_eq!(busy.index_status(), "updating");
        assert_eq!(busy.unindexed_bytes(), 2048);
        assert_eq!(metadata(json!({})).index_status(), "up-to-date");
    }

    #[test]
    fn query_request_skips_unset_fields() {
        let request = QueryRequest::ann("vector", vec![0.0, 0.5], 3).excluding("vector");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "rank_by": ["vector", "ANN", [0.0, 0.5]],
                "top_k": 3,
                "exclude_attributes": ["vector"]
            })
        );
        assert_eq!(
            serde_json::to_value(QueryRequest::by_id("doc-1")).unwrap(),
            json!({"top_k": 1, "filters": ["id", "Eq", "doc-1"], "include_attributes": true})
        );
    }
}

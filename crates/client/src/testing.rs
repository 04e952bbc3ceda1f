//! In-process fake of the turbopuffer REST API for tests.
//!
//! The server runs on its own thread and runtime so both async tests and
//! blocking CLI tests can point `TURBOPUFFER_BASE_URL` at it.

use std::collections::{BTreeMap, HashMap};
use std::net::TcpListener;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;

/// One recorded call: method, path and JSON body (`null` for none)
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Value,
}

#[derive(Debug, Clone, Default)]
struct FakeNamespace {
    metadata: Map<String, Value>,
    rows: Vec<Map<String, Value>>,
    recall: Option<Value>,
    metadata_failure: Option<u16>,
    write_failure: Option<u16>,
    delete_failure: Option<u16>,
}

#[derive(Debug, Default)]
struct FakeState {
    namespaces: BTreeMap<String, FakeNamespace>,
    requests: Vec<RecordedRequest>,
    page_size: usize,
}

type Shared = Arc<Mutex<FakeState>>;

fn lock(state: &Shared) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for the fake service
#[derive(Debug, Clone)]
pub struct FakeTurbopuffer {
    state: Shared,
}

impl Default for FakeTurbopuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTurbopuffer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                page_size: 100,
                ..FakeState::default()
            })),
        }
    }

    /// Add a namespace with the given metadata object
    pub fn namespace(self, id: &str, metadata: Value) -> Self {
        let metadata = metadata.as_object().cloned().unwrap_or_default();
        lock(&self.state).namespaces.insert(
            id.to_string(),
            FakeNamespace {
                metadata,
                ..FakeNamespace::default()
            },
        );
        self
    }

    pub fn rows(self, id: &str, rows: Vec<Value>) -> Self {
        {
            let mut state = lock(&self.state);
            let ns = state.namespaces.entry(id.to_string()).or_default();
            ns.rows = rows
                .into_iter()
                .filter_map(|row| row.as_object().cloned())
                .collect();
        }
        self
    }

    pub fn recall(self, id: &str, recall: Value) -> Self {
        lock(&self.state)
            .namespaces
            .entry(id.to_string())
            .or_default()
            .recall = Some(recall);
        self
    }

    pub fn fail_metadata(self, id: &str, status: u16) -> Self {
        lock(&self.state)
            .namespaces
            .entry(id.to_string())
            .or_default()
            .metadata_failure = Some(status);
        self
    }

    pub fn fail_write(self, id: &str, status: u16) -> Self {
        lock(&self.state)
            .namespaces
            .entry(id.to_string())
            .or_default()
            .write_failure = Some(status);
        self
    }

    pub fn fail_delete(self, id: &str, status: u16) -> Self {
        lock(&self.state)
            .namespaces
            .entry(id.to_string())
            .or_default()
            .delete_failure = Some(status);
        self
    }

    /// Namespaces returned per listing page
    pub fn page_size(self, page_size: usize) -> Self {
        lock(&self.state).page_size = page_size.max(1);
        self
    }

    /// Serve on a loopback port until the returned handle is dropped
    pub fn spawn(self) -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = router(Arc::clone(&self.state));

        let thread = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("fake server runtime");
            runtime.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .expect("fake server");
            });
        });

        FakeServer {
            base_url: format!("http://{addr}"),
            state: self.state,
            shutdown: Some(shutdown),
            thread: Some(thread),
        }
    }
}

/// Handle to a running fake; stops the server on drop
pub struct FakeServer {
    base_url: String,
    state: Shared,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FakeServer {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|req| req.method == method && req.path == path)
            .collect()
    }

    pub fn namespace_ids(&self) -> Vec<String> {
        lock(&self.state).namespaces.keys().cloned().collect()
    }

    pub fn schema_of(&self, id: &str) -> Option<Value> {
        lock(&self.state)
            .namespaces
            .get(id)
            .and_then(|ns| ns.metadata.get("schema").cloned())
    }

    pub fn rows_of(&self, id: &str) -> Vec<Value> {
        lock(&self.state)
            .namespaces
            .get(id)
            .map(|ns| ns.rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/v1/namespaces", get(list_namespaces))
        .route("/v1/namespaces/:ns/metadata", get(metadata))
        .route("/v1/namespaces/:ns/_debug/recall", post(recall))
        .route("/v2/namespaces/:ns/query", post(query))
        .route("/v2/namespaces/:ns", post(write).delete(delete))
        .with_state(state)
}

type Reply = (StatusCode, Json<Value>);

fn record(state: &mut FakeState, method: &str, path: String, body: Value) {
    state.requests.push(RecordedRequest {
        method: method.to_string(),
        path,
        body,
    });
}

fn error(status: u16, message: &str) -> Reply {
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(json!({ "status": "error", "error": message })),
    )
}

fn not_found(ns: &str) -> Reply {
    error(404, &format!("namespace '{ns}' not found"))
}

async fn list_namespaces(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    let mut state = lock(&state);
    record(&mut state, "GET", "/v1/namespaces".to_string(), json!(params));
    let prefix = params.get("prefix").cloned().unwrap_or_default();
    let start: usize = params
        .get("cursor")
        .and_then(|cursor| cursor.parse().ok())
        .unwrap_or(0);

    let matching: Vec<&String> = state
        .namespaces
        .keys()
        .filter(|id| id.starts_with(&prefix))
        .collect();
    let end = (start + state.page_size).min(matching.len());
    let page: Vec<Value> = matching
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .map(|id| json!({ "id": id }))
        .collect();
    let next_cursor = (end < matching.len()).then(|| end.to_string());
    (
        StatusCode::OK,
        Json(json!({ "namespaces": page, "next_cursor": next_cursor })),
    )
}

async fn metadata(State(state): State<Shared>, Path(ns): Path<String>) -> Reply {
    let mut state = lock(&state);
    record(&mut state, "GET", format!("/v1/namespaces/{ns}/metadata"), Value::Null);
    match state.namespaces.get(&ns) {
        Some(FakeNamespace {
            metadata_failure: Some(status),
            ..
        }) => error(*status, "metadata unavailable"),
        Some(namespace) => {
            let mut metadata = namespace.metadata.clone();
            metadata
                .entry("approx_row_count")
                .or_insert_with(|| json!(namespace.rows.len()));
            (StatusCode::OK, Json(Value::Object(metadata)))
        }
        None => not_found(&ns),
    }
}

async fn recall(
    State(state): State<Shared>,
    Path(ns): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = lock(&state);
    record(&mut state, "POST", format!("/v1/namespaces/{ns}/_debug/recall"), body);
    match state.namespaces.get(&ns).map(|namespace| namespace.recall.clone()) {
        Some(Some(recall)) => (StatusCode::OK, Json(recall)),
        Some(None) => error(400, "recall is not available for this namespace"),
        None => not_found(&ns),
    }
}

async fn query(
    State(state): State<Shared>,
    Path(ns): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = lock(&state);
    record(&mut state, "POST", format!("/v2/namespaces/{ns}/query"), body.clone());
    let Some(namespace) = state.namespaces.get(&ns) else {
        return not_found(&ns);
    };

    let top_k = body.get("top_k").and_then(Value::as_u64).unwrap_or(10) as usize;
    let id_filter = body
        .get("filters")
        .and_then(Value::as_array)
        .filter(|filter| filter.len() == 3 && filter[0] == "id" && filter[1] == "Eq")
        .map(|filter| filter[2].clone());
    let excluded: Vec<String> = body
        .get("exclude_attributes")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(|name| name.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let ranked = body.get("rank_by").is_some();

    let rows: Vec<Value> = namespace
        .rows
        .iter()
        .filter(|row| id_filter.as_ref().map_or(true, |id| row.get("id") == Some(id)))
        .take(top_k)
        .enumerate()
        .map(|(rank, row)| {
            let mut row = row.clone();
            for name in &excluded {
                row.remove(name);
            }
            if ranked {
                row.insert("$dist".to_string(), json!(rank as f64 * 0.125));
            }
            Value::Object(row)
        })
        .collect();
    (
        StatusCode::OK,
        Json(json!({ "rows": rows, "performance": { "query_execution_ms": 1.5 } })),
    )
}

async fn write(
    State(state): State<Shared>,
    Path(ns): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = lock(&state);
    record(&mut state, "POST", format!("/v2/namespaces/{ns}"), body.clone());
    let namespace = state.namespaces.entry(ns).or_default();
    if let Some(status) = namespace.write_failure {
        return error(status, "write rejected");
    }

    if let Some(schema) = body.get("schema").and_then(Value::as_object) {
        let current = namespace
            .metadata
            .entry("schema")
            .or_insert_with(|| json!({}));
        if let Some(current) = current.as_object_mut() {
            for (name, ty) in schema {
                current.insert(name.clone(), ty.clone());
            }
        }
    }
    let upserts = body
        .get("upsert_rows")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for row in upserts.into_iter().filter_map(|row| row.as_object().cloned()) {
        let id = row.get("id").cloned();
        match namespace.rows.iter_mut().find(|existing| existing.get("id") == id.as_ref()) {
            Some(existing) => *existing = row,
            None => namespace.rows.push(row),
        }
    }
    namespace
        .metadata
        .insert("approx_row_count".to_string(), json!(namespace.rows.len()));
    (StatusCode::OK, Json(json!({ "status": "OK" })))
}

async fn delete(State(state): State<Shared>, Path(ns): Path<String>) -> Reply {
    let mut state = lock(&state);
    record(&mut state, "DELETE", format!("/v2/namespaces/{ns}"), Value::Null);
    match state.namespaces.get(&ns).map(|namespace| namespace.delete_failure) {
        Some(Some(status)) => error(status, "delete rejected"),
        Some(None) => {
            state.namespaces.remove(&ns);
            (StatusCode::OK, Json(json!({ "status": "OK" })))
        }
        None => not_found(&ns),
    }
}

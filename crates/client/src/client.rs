use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::debug::debug_json;
use crate::error::{ClientError, Result};
use crate::types::{
    NamespaceListPage, NamespaceMetadata, QueryRequest, QueryResponse, RecallData, RecallRequest,
    WriteRequest,
};

const RECALL_SAMPLES: u32 = 25;
const RECALL_TOP_K: u32 = 10;

/// Client for one turbopuffer endpoint (a region, or a fixed base URL)
#[derive(Debug, Clone)]
pub struct TurbopufferClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TurbopufferClient {
    pub fn new(config: &ClientConfig, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("tpuff/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ClientError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Every namespace id, following pagination cursors
    pub async fn list_namespaces(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query: Vec<(&str, &str)> = Vec::new();
            if let Some(prefix) = prefix {
                query.push(("prefix", prefix));
            }
            if let Some(cursor) = cursor.as_deref() {
                query.push(("cursor", cursor));
            }
            let path = "/v1/namespaces".to_string();
            let request = self.request(Method::GET, &path).query(&query);
            let page: NamespaceListPage = self.send("GET", path, request).await?;

            ids.extend(page.namespaces.into_iter().map(|ns| ns.id));
            match page.next_cursor.filter(|next| !next.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(ids)
    }

    /// Namespace metadata; `None` when the namespace does not exist
    pub async fn metadata(&self, namespace: &str) -> Result<Option<NamespaceMetadata>> {
        let path = format!("/v1/namespaces/{namespace}/metadata");
        let request = self.request(Method::GET, &path);
        match self.send("GET", path, request).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn query(&self, namespace: &str, query: &QueryRequest) -> Result<QueryResponse> {
        let path = format!("/v2/namespaces/{namespace}/query");
        self.post(path, query).await
    }

    pub async fn write(&self, namespace: &str, write: &WriteRequest) -> Result<()> {
        let path = format!("/v2/namespaces/{namespace}");
        let _: Value = self.post(path, write).await?;
        Ok(())
    }

    pub async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let path = format!("/v2/namespaces/{namespace}");
        let request = self.request(Method::DELETE, &path);
        let _: Value = self.send("DELETE", path, request).await?;
        Ok(())
    }

    /// Sampled ANN recall against exhaustive search
    pub async fn recall(&self, namespace: &str) -> Result<RecallData> {
        let path = format!("/v1/namespaces/{namespace}/_debug/recall");
        let body = RecallRequest {
            num: RECALL_SAMPLES,
            top_k: RECALL_TOP_K,
        };
        self.post(path, &body).await
    }

    async fn post<B, T>(&self, path: String, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug_json(&format!("POST {path}"), body);
        let request = self.request(Method::POST, &path).json(body);
        self.send("POST", path, request).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        path: String,
        request: RequestBuilder,
    ) -> Result<T> {
        log::debug!("{method} {}{path}", self.base_url);
        let response = request.send().await.map_err(|source| ClientError::Http {
            method,
            path: path.clone(),
            source,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| ClientError::Http {
            method,
            path: path.clone(),
            source,
        })?;
        log::debug!("{method} {path} -> {}", status.as_u16());

        if !status.is_success() {
            return Err(ClientError::Api {
                method,
                path,
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let value: Value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|err| ClientError::Decode {
                path: path.clone(),
                message: err.to_string(),
            })?
        };
        debug_json("response", &value);
        serde_json::from_value(value).map_err(|err| ClientError::Decode {
            path,
            message: err.to_string(),
        })
    }
}

/// Pull a readable message out of an error body
fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => ["error", "message"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| trimmed.to_string()),
        _ => trimmed.to_string(),
    }
}

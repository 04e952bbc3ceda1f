//! Prometheus exporter for namespace metrics.
//!
//! A refresh loop renders namespace gauges into exposition text on a fixed
//! interval; HTTP handlers only ever read the last rendered snapshot.
//!
//! ```text
//! interval ──> fetch_namespaces_with_metadata ──> GaugeVecs ──> TextEncoder ─┐
//!                     │                                                      ├─> Snapshot
//!                     └─ recall (every recall interval, cached between) ─────┘      │
//!                                                     /metrics, /health, / <────────┘
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use console::style;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use prometheus::{Encoder, Gauge, GaugeVec, IntGauge, Opts, Registry, TextEncoder};
use serde_json::json;
use tpuff_client::{fetch_namespaces_with_metadata, ClientCache, NamespaceWithMetadata, RecallData, RegionScope};

const WAITING_TEXT: &str = "# Waiting for first scrape...\n";

const NAMESPACE_LABELS: [&str; 4] = ["namespace", "region", "encryption", "index_status"];

/// How the exporter queries the service and what it advertises
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub port: u16,
    pub scope: RegionScope,
    pub interval: Duration,
    pub include_recall: bool,
    pub recall_interval: Duration,
}

impl ExporterConfig {
    pub fn region_mode(&self) -> String {
        match &self.scope {
            RegionScope::All => "All regions".to_string(),
            RegionScope::Single(Some(region)) => region.clone(),
            RegionScope::Single(None) => "Default".to_string(),
        }
    }
}

/// What the HTTP handlers serve
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub text: String,
    pub last_update: DateTime<Utc>,
    pub error: Option<String>,
}

impl Snapshot {
    fn waiting() -> Self {
        Self {
            text: WAITING_TEXT.to_string(),
            last_update: Utc::now(),
            error: None,
        }
    }
}

pub type SharedSnapshot = Arc<RwLock<Snapshot>>;

fn iso(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn encode(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Render namespace gauges. Namespaces without metadata are left out and a
/// gauge with no samples is not emitted at all.
pub fn namespace_metrics(namespaces: &[NamespaceWithMetadata]) -> Result<String> {
    let registry = Registry::new();
    let gauge = |name: &str, help: &str, labels: &[&str]| -> Result<GaugeVec> {
        let vec = GaugeVec::new(Opts::new(name, help), labels)?;
        registry.register(Box::new(vec.clone()))?;
        Ok(vec)
    };

    let rows = gauge(
        "turbopuffer_namespace_rows",
        "Approximate number of rows in namespace",
        &NAMESPACE_LABELS,
    )?;
    let logical_bytes = gauge(
        "turbopuffer_namespace_logical_bytes",
        "Approximate logical storage size in bytes",
        &NAMESPACE_LABELS,
    )?;
    let unindexed_bytes = gauge(
        "turbopuffer_namespace_unindexed_bytes",
        "Number of unindexed bytes (0 when index is up-to-date)",
        &NAMESPACE_LABELS,
    )?;
    let recall = gauge(
        "turbopuffer_namespace_recall",
        "Average vector recall estimation (0-1 scale)",
        &NAMESPACE_LABELS,
    )?;
    let mut info_labels = NAMESPACE_LABELS.to_vec();
    info_labels.push("updated_at");
    let info = gauge(
        "turbopuffer_namespace_info",
        "Namespace information with labels",
        &info_labels,
    )?;

    for ns in namespaces {
        let Some(metadata) = &ns.metadata else {
            continue;
        };
        let region = ns.region.as_deref().unwrap_or("unknown");
        let labels = [
            ns.namespace_id.as_str(),
            region,
            metadata.encryption_type(),
            metadata.index_status(),
        ];

        rows.with_label_values(&labels)
            .set(metadata.approx_row_count as f64);
        logical_bytes
            .with_label_values(&labels)
            .set(metadata.approx_logical_bytes as f64);
        unindexed_bytes
            .with_label_values(&labels)
            .set(metadata.unindexed_bytes() as f64);
        if let Some(data) = &ns.recall {
            recall.with_label_values(&labels).set(data.avg_recall);
        }
        let updated_at = metadata.updated_at.as_deref().unwrap_or("");
        let mut with_updated = labels.to_vec();
        with_updated.push(updated_at);
        info.with_label_values(&with_updated).set(1.0);
    }

    encode(&registry)
}

/// The exporter's own health gauges, kept across refreshes
struct SelfMetrics {
    registry: Registry,
    scrape_duration: Gauge,
    last_scrape: Gauge,
    success: IntGauge,
}

impl SelfMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();
        let scrape_duration = Gauge::with_opts(Opts::new(
            "turbopuffer_exporter_scrape_duration_seconds",
            "Time taken to fetch metrics from Turbopuffer API",
        ))?;
        let last_scrape = Gauge::with_opts(Opts::new(
            "turbopuffer_exporter_last_scrape_timestamp_seconds",
            "Unix timestamp of last successful scrape",
        ))?;
        let success = IntGauge::with_opts(Opts::new(
            "turbopuffer_exporter_last_scrape_success",
            "1 if the last refresh succeeded, 0 otherwise",
        ))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(last_scrape.clone()))?;
        registry.register(Box::new(success.clone()))?;
        Ok(Self {
            registry,
            scrape_duration,
            last_scrape,
            success,
        })
    }
}

/// Recall estimates from the last recall sweep
#[derive(Debug, Default)]
pub struct RecallCache {
    entries: HashMap<String, (Option<String>, RecallData)>,
    updated: Option<Instant>,
}

impl RecallCache {
    pub fn is_due(&self, every: Duration, now: Instant) -> bool {
        self.updated
            .map_or(true, |at| now.saturating_duration_since(at) >= every)
    }

    /// Replace the cache with what a recall sweep returned
    pub fn store(&mut self, namespaces: &[NamespaceWithMetadata], now: Instant) {
        self.entries = namespaces
            .iter()
            .filter_map(|ns| {
                ns.recall
                    .map(|recall| (ns.namespace_id.clone(), (ns.region.clone(), recall)))
            })
            .collect();
        self.updated = Some(now);
    }

    /// Fill in cached recall for namespaces seen in the same region
    pub fn merge(&self, namespaces: &mut [NamespaceWithMetadata]) {
        for ns in namespaces {
            if let Some((region, recall)) = self.entries.get(&ns.namespace_id) {
                if *region == ns.region {
                    ns.recall = Some(*recall);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct Exporter {
    cache: ClientCache,
    config: ExporterConfig,
    recall: RecallCache,
    self_metrics: SelfMetrics,
    last_good: String,
    snapshot: SharedSnapshot,
}

impl Exporter {
    pub fn new(cache: ClientCache, config: ExporterConfig) -> Result<Self> {
        Ok(Self {
            cache,
            config,
            recall: RecallCache::default(),
            self_metrics: SelfMetrics::new()?,
            last_good: WAITING_TEXT.to_string(),
            snapshot: Arc::new(RwLock::new(Snapshot::waiting())),
        })
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        Arc::clone(&self.snapshot)
    }

    async fn collect(&mut self) -> Result<String> {
        let refresh_recall = self.config.include_recall
            && self.recall.is_due(self.config.recall_interval, Instant::now());
        if refresh_recall {
            log::debug!("refreshing recall data");
        }

        let mut namespaces =
            fetch_namespaces_with_metadata(&self.cache, &self.config.scope, refresh_recall).await?;
        log::debug!("fetched {} namespace(s)", namespaces.len());

        if refresh_recall {
            self.recall.store(&namespaces, Instant::now());
            log::debug!("cached recall for {} namespace(s)", self.recall.len());
        } else if self.config.include_recall {
            self.recall.merge(&mut namespaces);
        }
        namespace_metrics(&namespaces)
    }

    /// Fetch, render and publish. A failed refresh keeps serving the last
    /// good text under an error comment.
    pub async fn refresh(&mut self) {
        let started = Instant::now();
        let collected = self.collect().await;
        let now = Utc::now();
        let metrics = &self.self_metrics;

        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        match collected {
            Ok(text) => {
                metrics.scrape_duration.set(started.elapsed().as_secs_f64());
                metrics.last_scrape.set(now.timestamp() as f64);
                metrics.success.set(1);
                self.last_good = text;
                snapshot.last_update = now;
                snapshot.error = None;
            }
            Err(err) => {
                let message = format!("{err:#}");
                eprintln!(
                    "{}",
                    style(format!("Error refreshing metrics: {message}"))
                        .red()
                        .for_stderr()
                );
                metrics.success.set(0);
                snapshot.error = Some(message);
            }
        }

        let own = encode(&metrics.registry).unwrap_or_else(|err| {
            log::warn!("Could not encode exporter metrics: {err}");
            String::new()
        });
        snapshot.text = match &snapshot.error {
            None => format!("{}{own}", self.last_good),
            Some(message) => format!(
                "# Error refreshing metrics: {message}\n# Last successful update: {}\n\n{}{own}",
                iso(&snapshot.last_update),
                self.last_good
            ),
        };
    }
}

/// Static facts shown on the index page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub port: u16,
    pub interval_secs: u64,
    pub region_mode: String,
    /// Recall refresh interval when recall is enabled
    pub recall_secs: Option<u64>,
}

impl From<&ExporterConfig> for PageInfo {
    fn from(config: &ExporterConfig) -> Self {
        Self {
            port: config.port,
            interval_secs: config.interval.as_secs(),
            region_mode: config.region_mode(),
            recall_secs: config
                .include_recall
                .then(|| config.recall_interval.as_secs()),
        }
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn index_page(snapshot: &Snapshot, page: &PageInfo) -> String {
    let recall = match page.recall_secs {
        Some(secs) => format!("enabled (refresh: {secs}s)"),
        None => "disabled".to_string(),
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>Turbopuffer Prometheus Exporter</title>
  <style>
    body {{ font-family: sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }}
    h1 {{ color: #333; }}
    a {{ color: #0066cc; text-decoration: none; }}
    a:hover {{ text-decoration: underline; }}
    .info {{ background: #f5f5f5; padding: 15px; border-radius: 5px; margin: 20px 0; }}
    code {{ background: #eee; padding: 2px 6px; border-radius: 3px; }}
  </style>
</head>
<body>
  <h1>Turbopuffer Prometheus Exporter</h1>
  <div class="info">
    <p><strong>Status:</strong> Running</p>
    <p><strong>Last Update:</strong> {last_update}</p>
    <p><strong>Refresh Interval:</strong> {interval}s</p>
    <p><strong>Region Mode:</strong> {region_mode}</p>
    <p><strong>Recall Metrics:</strong> {recall}</p>
  </div>
  <h2>Endpoints</h2>
  <ul>
    <li><a href="/metrics">/metrics</a> - Prometheus metrics endpoint</li>
    <li><a href="/health">/health</a> - Health check endpoint</li>
  </ul>
  <h2>Example Prometheus Configuration</h2>
  <pre><code>scrape_configs:
  - job_name: 'turbopuffer'
    scrape_interval: {interval}s
    static_configs:
      - targets: ['localhost:{port}']</code></pre>
</body>
</html>"#,
        last_update = iso(&snapshot.last_update),
        interval = page.interval_secs,
        region_mode = page.region_mode,
        port = page.port,
    )
}

/// Answer one GET by path
pub fn route(path: &str, snapshot: &Snapshot, page: &PageInfo) -> Response<Body> {
    match path {
        "/metrics" => respond(
            StatusCode::OK,
            "text/plain; charset=utf-8",
            snapshot.text.clone(),
        ),
        "/health" => {
            let health = json!({
                "status": "ok",
                "lastUpdate": iso(&snapshot.last_update),
                "error": snapshot.error,
            });
            respond(StatusCode::OK, "application/json", format!("{health:#}"))
        }
        "/" => respond(
            StatusCode::OK,
            "text/html; charset=utf-8",
            index_page(snapshot, page),
        ),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    }
}

/// Bind failure callers want to tell apart
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("Port {0} is already in use")]
    InUse(u16),
    #[error("Failed to bind port {port}: {source}")]
    Other {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Bind every interface on `port`
pub fn bind(port: u16) -> std::result::Result<TcpListener, BindError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).map_err(|source| {
        if source.kind() == std::io::ErrorKind::AddrInUse {
            BindError::InUse(port)
        } else {
            BindError::Other { port, source }
        }
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| BindError::Other { port, source })?;
    Ok(listener)
}

/// Which signal stopped the exporter
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                }
            }
            Err(err) => {
                log::warn!("SIGTERM handler unavailable: {err}");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}

/// Serve on an already bound listener until SIGINT/SIGTERM, refreshing in
/// the background
pub async fn serve(listener: TcpListener, mut exporter: Exporter) -> Result<()> {
    let page = Arc::new(PageInfo::from(exporter.config()));
    let snapshot = exporter.snapshot();
    let interval = exporter.config().interval;

    let make_service = make_service_fn(move |_| {
        let page = Arc::clone(&page);
        let snapshot = Arc::clone(&snapshot);
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let page = Arc::clone(&page);
                let snapshot = Arc::clone(&snapshot);
                async move {
                    let current = snapshot
                        .read()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clone();
                    Ok::<_, Infallible>(route(req.uri().path(), &current, &page))
                }
            }))
        }
    });

    let server = Server::from_tcp(listener)
        .context("Failed to start HTTP server")?
        .serve(make_service)
        .with_graceful_shutdown(async {
            let name = shutdown_signal().await;
            println!(
                "\n{}",
                style(format!("Received {name}, shutting down gracefully...")).yellow()
            );
        });

    let refresher = tokio::spawn(async move {
        let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            exporter.refresh().await;
        }
    });

    let served = server.await;
    refresher.abort();
    println!("{}", style("HTTP server closed").dim());
    served.context("Prometheus endpoint failed")
}

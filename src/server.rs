//! HTTP server with inline inspection
//!
//! Responsibilities:
//! - Accept TCP connections
//! - HTTP/1.1 parsing via hyper
//! - Spawn per-connection tasks
//! - Decision pipeline execution per request
//! - Operator surface (dashboard page, statistics endpoint)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::{FirewallError, Result};
use crate::events::{AttackEvent, EventLog};
use crate::inspect::{deny_response, DecisionPipeline, Verdict};
use crate::proxy::ProxyForwarder;
use crate::threat::{ClientSnapshot, ThreatTracker};

/// Main server struct with integrated decision pipeline and forwarder
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
    pipeline: Arc<DecisionPipeline>,
    forwarder: Arc<ProxyForwarder>,
    tracker: Arc<ThreatTracker>,
    events: Arc<EventLog>,
}

impl Server {
    pub async fn bind(
        addr: SocketAddr,
        pipeline: DecisionPipeline,
        forwarder: ProxyForwarder,
        tracker: Arc<ThreatTracker>,
        events: Arc<EventLog>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| FirewallError::Bind { addr, source: e })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|e| FirewallError::Config(format!("Failed to get local address: {}", e)))?;

        info!(%actual_addr, "Server bound successfully");

        Ok(Self {
            listener,
            addr: actual_addr,
            pipeline: Arc::new(pipeline),
            forwarder: Arc::new(forwarder),
            tracker,
            events,
        })
    }

    pub async fn run(self) -> Result<()> {
        info!(addr = %self.addr, "Starting server");

        loop {
            let (stream, remote_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(%e, "Failed to accept connection");
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let pipeline = self.pipeline.clone();
            let forwarder = self.forwarder.clone();
            let tracker = self.tracker.clone();
            let events = self.events.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    handle_request(
                        req,
                        remote_addr,
                        pipeline.clone(),
                        forwarder.clone(),
                        tracker.clone(),
                        events.clone(),
                    )
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(%remote_addr, %e, "Connection error");
                }
            });
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Handle a single HTTP request
///
/// Flow:
/// 1. Operator paths are answered locally and bypass inspection
/// 2. Unsupported methods get 405
/// 3. The decision pipeline produces a verdict for everything else
/// 4. Allow forwards, Throttle holds then forwards, Block returns 403
async fn handle_request(
    req: Request<Incoming>,
    remote_addr: SocketAddr,
    pipeline: Arc<DecisionPipeline>,
    forwarder: Arc<ProxyForwarder>,
    tracker: Arc<ThreatTracker>,
    events: Arc<EventLog>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!(%remote_addr, %method, uri = %req.uri(), "Request received");

    if is_operator_path(&path) {
        return Ok(operator_response(&method, &path, &tracker, &events));
    }

    if !method_allowed(&method) {
        return Ok(method_not_allowed());
    }

    let client = remote_addr.ip().to_string();
    let (parts, body) = req.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(%remote_addr, error = %e, "Failed to read request body");
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header("Content-Type", "text/plain")
                .body(Full::new(Bytes::from("Bad Request")))
                .unwrap());
        }
    };

    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;

    let response = match pipeline.evaluate(&parts, &body_bytes, &client, now_nanos) {
        Verdict::Block { reason } => deny_response(reason),
        Verdict::Throttle { delay } => {
            tokio::time::sleep(delay).await;
            forward_upstream(&forwarder, parts, body_bytes, remote_addr).await
        }
        Verdict::Allow { .. } => forward_upstream(&forwarder, parts, body_bytes, remote_addr).await,
    };

    Ok(response)
}

async fn forward_upstream(
    forwarder: &ProxyForwarder,
    parts: Parts,
    body: Bytes,
    remote_addr: SocketAddr,
) -> Response<Full<Bytes>> {
    match forwarder.forward(parts, body, remote_addr).await {
        Ok(response) => response,
        Err(e) => {
            error!(%remote_addr, error = %e, "Proxy forward failed");
            Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .header("Content-Type", "text/plain")
                .body(Full::new(Bytes::from("Bad Gateway")))
                .unwrap()
        }
    }
}

/// Paths answered by the firewall itself, never forwarded
fn is_operator_path(path: &str) -> bool {
    path == "/dashboard"
        || path.starts_with("/dashboard/")
        || path == "/api"
        || path.starts_with("/api/")
}

fn method_allowed(method: &Method) -> bool {
    matches!(
        method.as_str(),
        "GET" | "POST" | "PUT" | "DELETE" | "PATCH"
    )
}

fn method_not_allowed() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header("Allow", "GET, POST, PUT, DELETE, PATCH")
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from("Method Not Allowed")))
        .unwrap()
}

fn operator_response(
    method: &Method,
    path: &str,
    tracker: &ThreatTracker,
    events: &EventLog,
) -> Response<Full<Bytes>> {
    if method != Method::GET {
        return method_not_allowed();
    }

    if path == "/dashboard" || path.starts_with("/dashboard/") {
        return Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(Full::new(Bytes::from(DASHBOARD_HTML)))
            .unwrap();
    }

    if path == "/api/stats" {
        let now_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;
        return stats_response(tracker, events, now_nanos);
    }

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from("Not Found")))
        .unwrap()
}

/// Statistics document served at /api/stats
#[derive(Debug, Serialize)]
struct StatsDocument {
    clients: Vec<ClientSnapshot>,
    events: Vec<AttackEvent>,
    totals: Totals,
}

#[derive(Debug, Serialize)]
struct Totals {
    allowed: u64,
    blocked: u64,
}

fn stats_response(
    tracker: &ThreatTracker,
    events: &EventLog,
    now_nanos: u64,
) -> Response<Full<Bytes>> {
    let (allowed, blocked) = tracker.totals();
    let document = StatsDocument {
        clients: tracker.snapshot(now_nanos),
        events: events.snapshot(),
        totals: Totals { allowed, blocked },
    };

    match serde_json::to_string(&document) {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap(),
        Err(e) => {
            error!(error = %e, "Failed to serialize statistics");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header("Content-Type", "text/plain")
                .body(Full::new(Bytes::from("Internal Server Error")))
                .unwrap()
        }
    }
}

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Firewall Dashboard</title>
<style>
  body { font-family: monospace; background: #111; color: #ddd; margin: 2em; }
  h1 { color: #e33; }
  table { border-collapse: collapse; margin-bottom: 2em; }
  th, td { border: 1px solid #444; padding: 4px 10px; text-align: left; }
  .banned { color: #e33; }
</style>
</head>
<body>
<h1>Firewall Dashboard</h1>
<p>Allowed: <span id="allowed">0</span> | Blocked: <span id="blocked">0</span></p>
<h2>Clients</h2>
<table>
  <thead><tr><th>Client</th><th>Window</th><th>Banned</th><th>Allowed</th><th>Blocked</th><th>Last deny</th><th>Score</th></tr></thead>
  <tbody id="clients"></tbody>
</table>
<h2>Recent events</h2>
<table>
  <thead><tr><th>Time</th><th>Client</th><th>Category</th><th>Action</th></tr></thead>
  <tbody id="events"></tbody>
</table>
<script>
async function refresh() {
  const res = await fetch('/api/stats');
  const stats = await res.json();
  document.getElementById('allowed').textContent = stats.totals.allowed;
  document.getElementById('blocked').textContent = stats.totals.blocked;
  document.getElementById('clients').innerHTML = stats.clients.map(c =>
    `<tr><td>${c.client}</td><td>${c.window_count}</td>` +
    `<td class="${c.banned ? 'banned' : ''}">${c.banned}</td>` +
    `<td>${c.total_allowed}</td><td>${c.total_blocked}</td>` +
    `<td>${c.last_deny_reason ?? '-'}</td><td>${c.threat_score}</td></tr>`).join('');
  document.getElementById('events').innerHTML = stats.events.slice(-20).reverse().map(e =>
    `<tr><td>${new Date(e.timestamp_ms).toLocaleTimeString()}</td>` +
    `<td>${e.client}</td><td>${e.category}</td><td>${e.action}</td></tr>`).join('');
}
refresh();
setInterval(refresh, 2000);
</script>
</body>
</html>
"#;

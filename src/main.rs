//! Adaptive HTTP Firewall - Entry point

use std::net::SocketAddr;
use std::sync::Arc;

use adaptive_http_firewall::config::Config;
use adaptive_http_firewall::events::EventLog;
use adaptive_http_firewall::inspect::{
    CsrfHeuristic, DecisionPipeline, PipelineConfig, SignatureEngine,
};
use adaptive_http_firewall::proxy::{ForwarderConfig, ProxyForwarder};
use adaptive_http_firewall::server::Server;
use adaptive_http_firewall::threat::{ThreatTracker, ThresholdPolicy, TrackerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let tracker = Arc::new(ThreatTracker::new(TrackerConfig {
        window_secs: config.firewall.window_secs,
        ban_duration_secs: config.firewall.ban_duration_secs,
        decay_rate_per_sec: config.firewall.decay_rate_per_sec,
        thresholds: ThresholdPolicy {
            base_allow: config.firewall.base_allow_threshold,
            base_throttle: config.firewall.base_throttle_threshold,
            base_block: config.firewall.base_block_threshold,
            allow_floor: config.firewall.allow_floor,
            throttle_floor: config.firewall.throttle_floor,
            block_floor: config.firewall.block_floor,
        },
    }));
    let events = Arc::new(EventLog::new(config.firewall.event_log_capacity));

    let pipeline = DecisionPipeline::new(
        SignatureEngine::builtin(),
        CsrfHeuristic::new(config.firewall.csrf_safe_origin.clone()),
        tracker.clone(),
        events.clone(),
        PipelineConfig {
            csrf_block_threshold: config.firewall.csrf_block_threshold,
            throttle_delay: config.firewall.throttle_delay,
        },
    );

    let forwarder_config = ForwarderConfig::new(config.proxy.upstream_url.clone())
        .with_timeout(config.proxy.timeout)
        .with_preserve_host(config.proxy.preserve_host);
    let forwarder = ProxyForwarder::new(forwarder_config)?;

    info!(upstream = %config.proxy.upstream_url, "Firewall proxy starting");

    let server = Server::bind(addr, pipeline, forwarder, tracker, events).await?;
    server.run().await?;

    Ok(())
}

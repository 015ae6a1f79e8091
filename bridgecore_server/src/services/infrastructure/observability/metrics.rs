//! Prometheus metrics surface. The external monitor scrapes this directly;
//! BridgeCore never ships its own dashboards.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

use crate::config::ObservabilityConfig;
use crate::error::AppError;

pub struct MetricsGuard;

pub async fn init_metrics(config: &ObservabilityConfig) -> Result<MetricsGuard, AppError> {
  let addr: std::net::SocketAddr = config
    .metrics_bind_address
    .parse()
    .map_err(|e| AppError::Internal(format!("invalid metrics bind address: {e}")))?;

  PrometheusBuilder::new()
    .with_http_listener(addr)
    .install()
    .map_err(|e| AppError::Internal(format!("failed to install prometheus exporter: {e}")))?;

  tracing::info!(%addr, "metrics surface listening");
  Ok(MetricsGuard)
}

/// Named series grouped by the pipeline stage that emits them.
pub struct RequestMetrics;

impl RequestMetrics {
  pub fn record(tenant: &str, op: &str, status: u16, duration: Duration) {
    counter!("requests_total",
      "tenant" => tenant.to_string(), "op" => op.to_string(), "status" => status.to_string())
    .increment(1);
    histogram!("request_duration_seconds", "op" => op.to_string()).record(duration.as_secs_f64());
  }
}

pub struct CacheMetrics;

impl CacheMetrics {
  pub fn hit() {
    counter!("cache_hits_total").increment(1);
  }
  pub fn miss() {
    counter!("cache_misses_total").increment(1);
  }
}

pub struct RateLimitMetrics;

impl RateLimitMetrics {
  pub fn denied(tenant: &str, scope: &str) {
    counter!("ratelimit_denied_total", "tenant" => tenant.to_string(), "scope" => scope.to_string())
      .increment(1);
  }
}

pub struct UpstreamMetrics;

impl UpstreamMetrics {
  pub fn error(tenant: &str, kind: &str) {
    counter!("upstream_errors_total", "tenant" => tenant.to_string(), "kind" => kind.to_string())
      .increment(1);
  }
}

pub struct SyncMetrics;

impl SyncMetrics {
  pub fn ingested(tenant: &str, count: u64) {
    counter!("events_ingested_total", "tenant" => tenant.to_string()).increment(count);
  }

  pub fn cursor_lag(tenant: &str, lag: i64) {
    gauge!("cursor_lag", "tenant" => tenant.to_string()).set(lag.max(0) as f64);
  }
}

pub struct QueueMetrics;

impl QueueMetrics {
  pub fn depth(queue: &'static str, depth: usize) {
    gauge!("queue_depth", "queue" => queue).set(depth as f64);
  }

  pub fn dropped(queue: &'static str) {
    counter!("dropped_records_total", "queue" => queue).increment(1);
  }
}

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::time::Instant;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceHealth {
  pub name: &'static str,
  pub healthy: bool,
  pub latency_ms: u64,
  pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemHealth {
  pub healthy: bool,
  pub services: Vec<ServiceHealth>,
}

#[async_trait]
trait HealthChecker: Send + Sync {
  async fn check(&self) -> ServiceHealth;
}

struct DatabaseChecker(sqlx::PgPool);

#[async_trait]
impl HealthChecker for DatabaseChecker {
  async fn check(&self) -> ServiceHealth {
    let started = Instant::now();
    match sqlx::query("SELECT 1").fetch_one(&self.0).await {
      Ok(_) => ServiceHealth {
        name: "database",
        healthy: true,
        latency_ms: started.elapsed().as_millis() as u64,
        error: None,
      },
      Err(e) => ServiceHealth {
        name: "database",
        healthy: false,
        latency_ms: started.elapsed().as_millis() as u64,
        error: Some(e.to_string()),
      },
    }
  }
}

struct CacheChecker(crate::services::infrastructure::KvStore);

#[async_trait]
impl HealthChecker for CacheChecker {
  async fn check(&self) -> ServiceHealth {
    let started = Instant::now();
    match self.0.get_json::<bool>("health:probe").await {
      Ok(_) => ServiceHealth {
        name: "cache",
        healthy: true,
        latency_ms: started.elapsed().as_millis() as u64,
        error: None,
      },
      Err(e) => ServiceHealth {
        name: "cache",
        healthy: false,
        latency_ms: started.elapsed().as_millis() as u64,
        error: Some(e.to_string()),
      },
    }
  }
}

#[utoipa::path(get, path = "/health", responses((status = 200, description = "Process is alive")), tag = "health")]
pub async fn liveness() -> impl IntoResponse {
  StatusCode::OK
}

#[utoipa::path(
  get,
  path = "/health/db",
  responses((status = 200, description = "Database reachable"), (status = 503, description = "Database unreachable")),
  tag = "health"
)]
pub async fn database_health(State(state): State<AppState>) -> impl IntoResponse {
  let result = DatabaseChecker(state.pool.clone()).check().await;
  let status = if result.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
  (status, Json(result))
}

#[utoipa::path(
  get,
  path = "/health/cache",
  responses((status = 200, description = "Cache reachable"), (status = 503, description = "Cache unreachable")),
  tag = "health"
)]
pub async fn cache_health(State(state): State<AppState>) -> impl IntoResponse {
  let result = CacheChecker(state.kv.clone()).check().await;
  let status = if result.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
  (status, Json(result))
}

#[utoipa::path(
  get,
  path = "/health/full",
  responses((status = 200, description = "Every dependency reachable"), (status = 503, description = "At least one dependency unreachable")),
  tag = "health"
)]
pub async fn full_health(State(state): State<AppState>) -> impl IntoResponse {
  let services = vec![
    DatabaseChecker(state.pool.clone()).check().await,
    CacheChecker(state.kv.clone()).check().await,
  ];
  let healthy = services.iter().all(|s| s.healthy);
  let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
  (status, Json(SystemHealth { healthy, services }))
}

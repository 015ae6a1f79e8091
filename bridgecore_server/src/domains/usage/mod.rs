//! Append-only usage and error records, and their hourly/daily aggregates.

pub mod repository;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bridgecore_core::{error::Severity, TenantId, TenantUserId};

pub use repository::{PgUsageRepository, UsageRepository};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
  pub id: Uuid,
  pub tenant_id: TenantId,
  pub user_id: Option<TenantUserId>,
  pub timestamp: DateTime<Utc>,
  pub endpoint: String,
  pub method: String,
  pub model: Option<String>,
  pub request_bytes: i64,
  pub response_bytes: i64,
  pub latency_ms: i64,
  pub status_code: u16,
  pub client_ip: Option<String>,
  pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
  pub id: Uuid,
  pub tenant_id: TenantId,
  pub user_id: Option<TenantUserId>,
  pub timestamp: DateTime<Utc>,
  pub kind: String,
  pub message: String,
  pub stack_digest: Option<String>,
  pub endpoint: String,
  pub request_id: String,
  pub severity: Severity,
  pub resolved: bool,
  pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStat {
  pub tenant_id: TenantId,
  pub date: NaiveDate,
  pub hour: Option<i16>,
  pub count: i64,
  pub successes: i64,
  pub failures: i64,
  pub bytes_in: i64,
  pub bytes_out: i64,
  pub avg_latency_ms: f64,
  pub unique_users: i64,
  pub most_used_model: Option<String>,
  pub peak_hour: Option<i16>,
}

pub const USAGE_RETENTION_DAYS: i64 = 90;

/// Retention window applied to resolved error records; unresolved ones are
/// kept indefinitely until an operator marks them resolved.
pub const ERROR_RETENTION_DAYS_AFTER_RESOLVED: i64 = 90;

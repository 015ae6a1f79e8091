use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncPullRequest {
  pub device_id: String,
  pub app_type: String,
  pub model_filter: Option<String>,
  pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncEventDto {
  pub id: i64,
  pub model: String,
  pub record_id: i64,
  pub change_kind: String,
  #[schema(value_type = Object)]
  pub payload: Option<serde_json::Value>,
  pub priority: Option<String>,
  pub server_timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncPullResponse {
  pub events: Vec<SyncEventDto>,
  pub next_last_id: i64,
  pub cursor: SyncCursorDto,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncCursorDto {
  pub last_seen_event_id: i64,
  pub last_sync_at: Option<DateTime<Utc>>,
  pub cumulative_syncs: i64,
  pub cumulative_events: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SyncStateQuery {
  pub device_id: String,
  pub app_type: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncResetRequest {
  pub device_id: String,
  pub app_type: String,
}

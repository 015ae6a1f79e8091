use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookPushRequest {
  pub event_id: i64,
  pub model: String,
  pub record_id: i64,
  pub change_kind: String,
  #[schema(value_type = Object)]
  pub payload: Option<serde_json::Value>,
  pub priority: Option<String>,
  pub server_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookPushResponse {
  pub accepted: bool,
  pub event_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckUpdatesResponse {
  pub has_updates: bool,
  pub new_events_pulled: u32,
}

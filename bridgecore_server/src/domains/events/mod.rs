//! Upstream change events: the append-only, strictly-ordered stream the
//! sync engine pulls from.

pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bridgecore_core::{EventId, TenantId, Value};

pub use repository::{EventRepository, PgEventRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
  Create,
  Write,
  Unlink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
  pub id: EventId,
  pub tenant_id: TenantId,
  pub model: String,
  pub record_id: i64,
  pub change_kind: ChangeKind,
  pub server_timestamp: DateTime<Utc>,
  pub payload: Option<Value>,
  pub priority: Option<String>,
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use bridgecore_core::{CoreError, EventId, TenantId, Value};

use super::{ChangeKind, Event};

#[async_trait]
pub trait EventRepository: Send + Sync {
  /// Idempotent insert keyed on `(tenant_id, event_id)`: a duplicate id for
  /// the same tenant is silently ignored and does not error.
  async fn ingest(&self, event: &Event) -> Result<(), CoreError>;

  /// Events for `tenant_id` with id strictly greater than `after`, ordered
  /// ascending by id, capped at `limit`.
  async fn after(&self, tenant_id: TenantId, after: EventId, limit: u32) -> Result<Vec<Event>, CoreError>;

  /// The highest event id stored for this tenant, or `None` if it has no
  /// events yet. Used to bound pull-from-upstream polling.
  async fn max_id(&self, tenant_id: TenantId) -> Result<Option<EventId>, CoreError>;

  async fn delete_below(&self, tenant_id: TenantId, floor: EventId) -> Result<u64, CoreError>;
}

pub struct PgEventRepository {
  pool: PgPool,
}

impl PgEventRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl EventRepository for PgEventRepository {
  async fn ingest(&self, e: &Event) -> Result<(), CoreError> {
    let payload_json = e.payload.clone().map(|v| serde_json::Value::from(v));
    sqlx::query!(
      r#"
      INSERT INTO events (tenant_id, event_id, model, record_id, change_kind,
                           server_timestamp, payload, priority)
      VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
      ON CONFLICT (tenant_id, event_id) DO NOTHING
      "#,
      e.tenant_id.0,
      e.id.0,
      e.model,
      e.record_id,
      format!("{:?}", e.change_kind).to_lowercase(),
      e.server_timestamp,
      payload_json,
      e.priority,
    )
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn after(&self, tenant_id: TenantId, after: EventId, limit: u32) -> Result<Vec<Event>, CoreError> {
    let rows = sqlx::query_as!(
      EventRow,
      r#"
      SELECT tenant_id, event_id, model, record_id, change_kind as "change_kind: _",
             server_timestamp, payload, priority
      FROM events
      WHERE tenant_id = $1 AND event_id > $2
      ORDER BY event_id ASC
      LIMIT $3
      "#,
      tenant_id.0,
      after.0,
      limit as i64
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
  }

  async fn max_id(&self, tenant_id: TenantId) -> Result<Option<EventId>, CoreError> {
    let row = sqlx::query!(
      "SELECT MAX(event_id) as max_id FROM events WHERE tenant_id = $1",
      tenant_id.0
    )
    .fetch_one(&self.pool)
    .await?;
    Ok(row.max_id.map(EventId))
  }

  async fn delete_below(&self, tenant_id: TenantId, floor: EventId) -> Result<u64, CoreError> {
    let result = sqlx::query!(
      "DELETE FROM events WHERE tenant_id = $1 AND event_id < $2",
      tenant_id.0,
      floor.0
    )
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected())
  }
}

#[allow(dead_code)]
struct EventRow {
  tenant_id: uuid::Uuid,
  event_id: i64,
  model: String,
  record_id: i64,
  change_kind: ChangeKind,
  server_timestamp: DateTime<Utc>,
  payload: Option<serde_json::Value>,
  priority: Option<String>,
}

impl From<EventRow> for Event {
  fn from(r: EventRow) -> Self {
    Event {
      id: EventId(r.event_id),
      tenant_id: TenantId(r.tenant_id),
      model: r.model,
      record_id: r.record_id,
      change_kind: r.change_kind,
      server_timestamp: r.server_timestamp,
      payload: r.payload.map(Value::from),
      priority: r.priority,
    }
  }
}

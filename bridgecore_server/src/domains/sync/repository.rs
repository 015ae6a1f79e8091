use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use bridgecore_core::{CoreError, EventId, TenantId};

use super::{AppType, SyncCursor};

#[async_trait]
pub trait SyncRepository: Send + Sync {
  async fn get_or_create(
    &self,
    tenant_id: TenantId,
    upstream_user_id: i64,
    device_id: &str,
    app_type: AppType,
  ) -> Result<SyncCursor, CoreError>;

  /// Atomically advances `last_seen_event_id` to `new_last_id` iff it is
  /// strictly greater than the current value; returns `false` (no state
  /// change) if `new_last_id` is not an advance.
  async fn advance(&self, cursor_id: i64, new_last_id: EventId, count_delta: i64) -> Result<bool, CoreError>;

  async fn reset(&self, cursor_id: i64) -> Result<(), CoreError>;

  /// The lowest `last_seen_event_id` among a tenant's active cursors, i.e.
  /// the floor below which no active device still needs an event. `None`
  /// if the tenant has no active cursors yet.
  async fn min_active_last_seen(&self, tenant_id: TenantId) -> Result<Option<EventId>, CoreError>;
}

pub struct PgSyncRepository {
  pool: PgPool,
}

impl PgSyncRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl SyncRepository for PgSyncRepository {
  async fn get_or_create(
    &self,
    tenant_id: TenantId,
    upstream_user_id: i64,
    device_id: &str,
    app_type: AppType,
  ) -> Result<SyncCursor, CoreError> {
    let row = sqlx::query_as!(
      CursorRow,
      r#"
      INSERT INTO sync_cursors
        (tenant_id, upstream_user_id, device_id, app_type, last_seen_event_id,
         last_sync_at, cumulative_syncs, cumulative_events, active)
      VALUES ($1, $2, $3, $4, 0, NULL, 0, 0, true)
      ON CONFLICT (tenant_id, upstream_user_id, device_id, app_type) DO UPDATE
        SET active = true
      RETURNING id, tenant_id, upstream_user_id, device_id,
                app_type as "app_type: String",
                last_seen_event_id, last_sync_at, cumulative_syncs, cumulative_events, active
      "#,
      tenant_id.0,
      upstream_user_id,
      device_id,
      app_type.as_str(),
    )
    .fetch_one(&self.pool)
    .await?;

    Ok(row.into())
  }

  async fn advance(&self, cursor_id: i64, new_last_id: EventId, count_delta: i64) -> Result<bool, CoreError> {
    let result = sqlx::query!(
      r#"
      UPDATE sync_cursors
      SET last_seen_event_id = $2,
          last_sync_at = $3,
          cumulative_syncs = cumulative_syncs + 1,
          cumulative_events = cumulative_events + $4
      WHERE id = $1 AND last_seen_event_id < $2
      "#,
      cursor_id,
      new_last_id.0,
      Utc::now(),
      count_delta,
    )
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn reset(&self, cursor_id: i64) -> Result<(), CoreError> {
    sqlx::query!("UPDATE sync_cursors SET last_seen_event_id = 0 WHERE id = $1", cursor_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn min_active_last_seen(&self, tenant_id: TenantId) -> Result<Option<EventId>, CoreError> {
    let row = sqlx::query!(
      "SELECT MIN(last_seen_event_id) as floor FROM sync_cursors WHERE tenant_id = $1 AND active",
      tenant_id.0
    )
    .fetch_one(&self.pool)
    .await?;
    Ok(row.floor.map(EventId))
  }
}

struct CursorRow {
  id: i64,
  tenant_id: uuid::Uuid,
  upstream_user_id: i64,
  device_id: String,
  app_type: String,
  last_seen_event_id: i64,
  last_sync_at: Option<chrono::DateTime<chrono::Utc>>,
  cumulative_syncs: i64,
  cumulative_events: i64,
  active: bool,
}

impl From<CursorRow> for SyncCursor {
  fn from(r: CursorRow) -> Self {
    SyncCursor {
      id: r.id,
      tenant_id: TenantId(r.tenant_id),
      upstream_user_id: r.upstream_user_id,
      device_id: r.device_id,
      app_type: AppType::parse(&r.app_type),
      last_seen_event_id: EventId(r.last_seen_event_id),
      last_sync_at: r.last_sync_at,
      cumulative_syncs: r.cumulative_syncs,
      cumulative_events: r.cumulative_events,
      active: r.active,
    }
  }
}

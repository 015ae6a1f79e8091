//! Serves incremental pulls over the event store, filtered by app-type
//! profile, advancing the caller's cursor.

use std::sync::Arc;
use tokio::sync::Mutex;

use bridgecore_core::{CoreError, EventId, TenantId};

use crate::domains::events::{Event, EventRepository};
use crate::domains::sync::{AppType, SyncCursor, SyncRepository};
use crate::services::infrastructure::observability::metrics::SyncMetrics;

pub struct SyncPullResult {
  pub events: Vec<Event>,
  pub next_last_id: EventId,
  pub cursor: SyncCursor,
}

/// Per-cursor locks so concurrent pulls against the same cursor key are
/// serialized and a cursor can never regress or double-advance.
pub struct SyncEngine {
  events: Arc<dyn EventRepository>,
  cursors: Arc<dyn SyncRepository>,
  cursor_locks: dashmap::DashMap<i64, Arc<Mutex<()>>>,
}

impl SyncEngine {
  pub fn new(events: Arc<dyn EventRepository>, cursors: Arc<dyn SyncRepository>) -> Self {
    Self {
      events,
      cursors,
      cursor_locks: dashmap::DashMap::new(),
    }
  }

  fn lock_for(&self, cursor_id: i64) -> Arc<Mutex<()>> {
    self.cursor_locks.entry(cursor_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
  }

  /// `cursor_lag{tenant}` is the max across cursors of (tenant's highest
  /// event id − that cursor's last-seen id); approximated here per-pull
  /// using this cursor's own freshly-advanced position against the
  /// tenant's current max, since recomputing the true max across every
  /// cursor on every pull would be wasted work the gauge doesn't need.
  async fn record_lag(&self, tenant_id: TenantId, cursor_last_seen: EventId) {
    if let Ok(Some(max_id)) = self.events.max_id(tenant_id).await {
      let lag = max_id.0 - cursor_last_seen.0;
      SyncMetrics::cursor_lag(&tenant_id.to_string(), lag);
    }
  }

  pub async fn pull(
    &self,
    tenant_id: TenantId,
    upstream_user_id: i64,
    device_id: &str,
    app_type: AppType,
    limit: u32,
    model_filter: Option<&str>,
  ) -> Result<SyncPullResult, CoreError> {
    let cursor = self
      .cursors
      .get_or_create(tenant_id, upstream_user_id, device_id, app_type)
      .await?;

    let lock = self.lock_for(cursor.id);
    let _guard = lock.lock().await;

    // Re-read after acquiring the lock: another pull may have advanced it
    // while we were waiting.
    let cursor = self
      .cursors
      .get_or_create(tenant_id, upstream_user_id, device_id, app_type)
      .await?;

    let candidates = self.events.after(tenant_id, cursor.last_seen_event_id, limit).await?;

    let profile = app_type.model_profile();
    let filtered: Vec<Event> = candidates
      .into_iter()
      .filter(|e| match model_filter {
        Some(m) => e.model == m,
        None => profile.is_empty() || profile.contains(&e.model.as_str()),
      })
      .collect();

    if filtered.is_empty() {
      self.record_lag(tenant_id, cursor.last_seen_event_id).await;
      return Ok(SyncPullResult {
        next_last_id: cursor.last_seen_event_id,
        events: filtered,
        cursor,
      });
    }

    let max_id = filtered.iter().map(|e| e.id).max().unwrap_or(cursor.last_seen_event_id);
    let count_delta = filtered.len() as i64;
    self.cursors.advance(cursor.id, max_id, count_delta).await?;
    self.record_lag(tenant_id, max_id).await;

    let mut snapshot = cursor;
    snapshot.last_seen_event_id = max_id;
    snapshot.cumulative_syncs += 1;
    snapshot.cumulative_events += count_delta;

    Ok(SyncPullResult {
      events: filtered,
      next_last_id: max_id,
      cursor: snapshot,
    })
  }

  pub async fn state(
    &self,
    tenant_id: TenantId,
    upstream_user_id: i64,
    device_id: &str,
    app_type: AppType,
  ) -> Result<SyncCursor, CoreError> {
    self.cursors.get_or_create(tenant_id, upstream_user_id, device_id, app_type).await
  }

  pub async fn reset(
    &self,
    tenant_id: TenantId,
    upstream_user_id: i64,
    device_id: &str,
    app_type: AppType,
  ) -> Result<(), CoreError> {
    let cursor = self
      .cursors
      .get_or_create(tenant_id, upstream_user_id, device_id, app_type)
      .await?;
    let lock = self.lock_for(cursor.id);
    let _guard = lock.lock().await;
    self.cursors.reset(cursor.id).await
  }
}

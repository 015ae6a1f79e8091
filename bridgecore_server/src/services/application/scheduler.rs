//! Background periodic jobs: usage aggregation, retention sweeps, and
//! upstream session eviction. Every job is guarded by a cluster-wide
//! advisory lock so a multi-instance deployment runs each job exactly
//! once per tick, regardless of how many instances are ticking.

use chrono::{Datelike, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use bridgecore_core::{EventId, TenantId};

use crate::domains::registry::TenantRepository;
use crate::domains::sync::SyncRepository;
use crate::domains::usage::{UsageRepository, UsageStat};
use crate::services::application::session_pool::UpstreamSessionPool;
use crate::services::infrastructure::KvStore;

const TICK_INTERVAL: Duration = Duration::from_secs(60);
const EVICTION_INTERVAL: Duration = Duration::from_secs(300);
const HOURLY_JOB_MINUTE: u32 = 5;
const DAILY_JOB_HOUR: u32 = 0;
const DAILY_JOB_MINUTE: u32 = 30;
const RETENTION_JOB_HOUR: u32 = 2;
const RETENTION_JOB_MINUTE: u32 = 0;
const LOCK_TTL_S: u64 = 55;
const EVENT_RETENTION_GRACE: i64 = 10_000;

pub struct Scheduler {
  tenants: Arc<dyn TenantRepository>,
  usage: Arc<dyn UsageRepository>,
  events: Arc<dyn crate::domains::events::EventRepository>,
  cursors: Arc<dyn SyncRepository>,
  pool: Arc<UpstreamSessionPool>,
  kv: KvStore,
  usage_retention_days: u32,
}

impl Scheduler {
  pub fn new(
    tenants: Arc<dyn TenantRepository>,
    usage: Arc<dyn UsageRepository>,
    events: Arc<dyn crate::domains::events::EventRepository>,
    cursors: Arc<dyn SyncRepository>,
    pool: Arc<UpstreamSessionPool>,
    kv: KvStore,
    usage_retention_days: u32,
  ) -> Self {
    Self {
      tenants,
      usage,
      events,
      cursors,
      pool,
      kv,
      usage_retention_days,
    }
  }

  /// Spawns the two ticking background tasks: one for the calendar-aligned
  /// jobs, one for the idle-session sweep. Does not block the caller.
  pub fn spawn(self: Arc<Self>) {
    let calendar = self.clone();
    tokio::spawn(async move { calendar.run_calendar_loop().await });

    let eviction = self;
    tokio::spawn(async move { eviction.run_eviction_loop().await });
  }

  async fn run_calendar_loop(&self) {
    let mut last_fired: Option<(u32, u32, u32)> = None;
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    loop {
      ticker.tick().await;
      let now = Utc::now();
      let slot = (now.day(), now.hour(), now.minute());
      if last_fired == Some(slot) {
        continue;
      }

      if now.minute() == HOURLY_JOB_MINUTE {
        self.run_guarded("hourly-aggregation", LOCK_TTL_S, || self.run_hourly_aggregation()).await;
      }
      if now.hour() == DAILY_JOB_HOUR && now.minute() == DAILY_JOB_MINUTE {
        self.run_guarded("daily-aggregation", LOCK_TTL_S, || self.run_daily_aggregation()).await;
      }
      if now.hour() == RETENTION_JOB_HOUR && now.minute() == RETENTION_JOB_MINUTE {
        self.run_guarded("retention-sweep", LOCK_TTL_S, || self.run_retention_sweep()).await;
      }
      last_fired = Some(slot);
    }
  }

  async fn run_eviction_loop(&self) {
    let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
    loop {
      ticker.tick().await;
      self.pool.evict_idle().await;
    }
  }

  /// Acquires a cluster-wide lock for `resource`, runs `job` only if the
  /// lock was won, and always releases it afterwards.
  async fn run_guarded<F, Fut>(&self, resource: &str, ttl_s: u64, job: F)
  where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
  {
    let token = Uuid::new_v4().to_string();
    match self.kv.try_lock(resource, ttl_s, &token).await {
      Ok(true) => {
        job().await;
        if let Err(e) = self.kv.release_lock(resource, &token).await {
          tracing::warn!(error = %e, resource, "failed to release scheduler lock");
        }
      }
      Ok(false) => {
        tracing::debug!(resource, "scheduler job already held by another instance");
      }
      Err(e) => {
        tracing::warn!(error = %e, resource, "failed to acquire scheduler lock");
      }
    }
  }

  /// Folds the last hour's `UsageRecord`s into a per-tenant `usage_stats`
  /// row keyed by (tenant, date, hour).
  async fn run_hourly_aggregation(&self) {
    let now = Utc::now();
    let window_start = now - chrono::Duration::hours(1);

    let tenant_ids = match self.tenants.list_tenant_ids().await {
      Ok(ids) => ids,
      Err(e) => {
        tracing::warn!(error = %e, "hourly aggregation: failed to list tenants");
        return;
      }
    };

    for tenant_id in tenant_ids {
      if let Err(e) = self.aggregate_hour(tenant_id, window_start, now).await {
        tracing::warn!(%tenant_id, error = %e, "hourly aggregation failed for tenant");
      }
    }
  }

  async fn aggregate_hour(
    &self,
    tenant_id: TenantId,
    window_start: chrono::DateTime<Utc>,
    window_end: chrono::DateTime<Utc>,
  ) -> Result<(), bridgecore_core::CoreError> {
    let records = self.usage.usage_between(tenant_id, window_start, window_end).await?;
    if records.is_empty() {
      return Ok(());
    }

    let count = records.len() as i64;
    let successes = records.iter().filter(|r| r.status_code < 400).count() as i64;
    let failures = count - successes;
    let bytes_in: i64 = records.iter().map(|r| r.request_bytes).sum();
    let bytes_out: i64 = records.iter().map(|r| r.response_bytes).sum();
    let avg_latency_ms = records.iter().map(|r| r.latency_ms as f64).sum::<f64>() / count as f64;
    let unique_users = records
      .iter()
      .filter_map(|r| r.user_id)
      .collect::<std::collections::HashSet<_>>()
      .len() as i64;
    let most_used_model = most_frequent_model(&records);

    let stat = UsageStat {
      tenant_id,
      date: window_start.date_naive(),
      hour: Some(window_start.hour() as i16),
      count,
      successes,
      failures,
      bytes_in,
      bytes_out,
      avg_latency_ms,
      unique_users,
      most_used_model,
      peak_hour: None,
    };

    self.usage.upsert_hourly_stat(&stat).await
  }

  /// Folds a calendar day's hourly stats into the day-level row, carrying
  /// forward the hour with the highest call count as `peak_hour`.
  async fn run_daily_aggregation(&self) {
    let yesterday = (Utc::now() - chrono::Duration::days(1)).date_naive();

    let tenant_ids = match self.tenants.list_tenant_ids().await {
      Ok(ids) => ids,
      Err(e) => {
        tracing::warn!(error = %e, "daily aggregation: failed to list tenants");
        return;
      }
    };

    for tenant_id in tenant_ids {
      if let Err(e) = self.aggregate_day(tenant_id, yesterday).await {
        tracing::warn!(%tenant_id, error = %e, "daily aggregation failed for tenant");
      }
    }
  }

  async fn aggregate_day(
    &self,
    tenant_id: TenantId,
    date: chrono::NaiveDate,
  ) -> Result<(), bridgecore_core::CoreError> {
    let hourly = self.usage.hourly_stats_for_day(tenant_id, date).await?;
    if hourly.is_empty() {
      return Ok(());
    }

    let count: i64 = hourly.iter().map(|s| s.count).sum();
    let successes: i64 = hourly.iter().map(|s| s.successes).sum();
    let failures: i64 = hourly.iter().map(|s| s.failures).sum();
    let bytes_in: i64 = hourly.iter().map(|s| s.bytes_in).sum();
    let bytes_out: i64 = hourly.iter().map(|s| s.bytes_out).sum();
    let avg_latency_ms = hourly.iter().map(|s| s.avg_latency_ms * s.count as f64).sum::<f64>() / count.max(1) as f64;
    let unique_users = hourly.iter().map(|s| s.unique_users).max().unwrap_or(0);
    let most_used_model = hourly
      .iter()
      .max_by_key(|s| s.count)
      .and_then(|s| s.most_used_model.clone());
    let peak_hour = hourly.iter().max_by_key(|s| s.count).and_then(|s| s.hour);

    let stat = UsageStat {
      tenant_id,
      date,
      hour: None,
      count,
      successes,
      failures,
      bytes_in,
      bytes_out,
      avg_latency_ms,
      unique_users,
      most_used_model,
      peak_hour,
    };

    self.usage.upsert_daily_stat(&stat).await
  }

  /// Deletes usage records past their retention window, and trims events
  /// below the floor no active sync cursor still needs (minus a grace
  /// margin so a slow or re-activated device isn't starved mid-catch-up).
  async fn run_retention_sweep(&self) {
    let cutoff = Utc::now() - chrono::Duration::days(self.usage_retention_days as i64);
    match self.usage.prune_usage_older_than(cutoff).await {
      Ok(n) if n > 0 => tracing::info!(pruned = n, "retention sweep: pruned usage records"),
      Ok(_) => {}
      Err(e) => tracing::warn!(error = %e, "retention sweep: usage prune failed"),
    }

    let tenant_ids = match self.tenants.list_tenant_ids().await {
      Ok(ids) => ids,
      Err(e) => {
        tracing::warn!(error = %e, "retention sweep: failed to list tenants");
        return;
      }
    };

    for tenant_id in tenant_ids {
      let floor = match self.cursors.min_active_last_seen(tenant_id).await {
        Ok(Some(floor)) => floor,
        Ok(None) => continue,
        Err(e) => {
          tracing::warn!(%tenant_id, error = %e, "retention sweep: cursor floor lookup failed");
          continue;
        }
      };
      let grace_floor = EventId((floor.0 - EVENT_RETENTION_GRACE).max(0));
      if let Err(e) = self.events.delete_below(tenant_id, grace_floor).await {
        tracing::warn!(%tenant_id, error = %e, "retention sweep: event trim failed");
      }
    }
  }
}

fn most_frequent_model(records: &[crate::domains::usage::UsageRecord]) -> Option<String> {
  let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
  for r in records {
    if let Some(model) = r.model.as_deref() {
      *counts.entry(model).or_insert(0) += 1;
    }
  }
  counts.into_iter().max_by_key(|(_, n)| *n).map(|(m, _)| m.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domains::usage::UsageRecord;
  use bridgecore_core::TenantId;
  use uuid::Uuid;

  fn record(model: Option<&str>) -> UsageRecord {
    UsageRecord {
      id: Uuid::new_v4(),
      tenant_id: TenantId(Uuid::new_v4()),
      user_id: None,
      timestamp: Utc::now(),
      endpoint: "/api/v1/odoo/search_read".to_string(),
      method: "search_read".to_string(),
      model: model.map(|m| m.to_string()),
      request_bytes: 0,
      response_bytes: 0,
      latency_ms: 10,
      status_code: 200,
      client_ip: None,
      user_agent: None,
    }
  }

  #[test]
  fn picks_the_most_frequent_model() {
    let records = vec![
      record(Some("res.partner")),
      record(Some("sale.order")),
      record(Some("res.partner")),
    ];
    assert_eq!(most_frequent_model(&records), Some("res.partner".to_string()));
  }

  #[test]
  fn ignores_records_with_no_model() {
    let records = vec![record(None), record(None)];
    assert_eq!(most_frequent_model(&records), None);
  }

  #[test]
  fn empty_records_yield_no_model() {
    assert_eq!(most_frequent_model(&[]), None);
  }
}

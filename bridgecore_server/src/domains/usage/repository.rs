use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use bridgecore_core::{CoreError, TenantId};

use super::{ErrorRecord, UsageRecord, UsageStat};

#[async_trait]
pub trait UsageRepository: Send + Sync {
  async fn insert_usage(&self, record: &UsageRecord) -> Result<(), CoreError>;
  async fn insert_error(&self, record: &ErrorRecord) -> Result<(), CoreError>;

  async fn usage_between(
    &self,
    tenant_id: TenantId,
    from: chrono::DateTime<chrono::Utc>,
    to: chrono::DateTime<chrono::Utc>,
  ) -> Result<Vec<UsageRecord>, CoreError>;

  async fn upsert_hourly_stat(&self, stat: &UsageStat) -> Result<(), CoreError>;
  async fn upsert_daily_stat(&self, stat: &UsageStat) -> Result<(), CoreError>;
  async fn hourly_stats_for_day(&self, tenant_id: TenantId, date: NaiveDate) -> Result<Vec<UsageStat>, CoreError>;

  async fn prune_usage_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64, CoreError>;
}

pub struct PgUsageRepository {
  pool: PgPool,
}

impl PgUsageRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl UsageRepository for PgUsageRepository {
  async fn insert_usage(&self, r: &UsageRecord) -> Result<(), CoreError> {
    sqlx::query!(
      r#"
      INSERT INTO usage_records
        (id, tenant_id, user_id, "timestamp", endpoint, method, model,
         request_bytes, response_bytes, latency_ms, status_code, client_ip, user_agent)
      VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
      "#,
      r.id,
      r.tenant_id.0,
      r.user_id.map(|u| u.0),
      r.timestamp,
      r.endpoint,
      r.method,
      r.model,
      r.request_bytes,
      r.response_bytes,
      r.latency_ms,
      r.status_code as i32,
      r.client_ip,
      r.user_agent,
    )
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn insert_error(&self, r: &ErrorRecord) -> Result<(), CoreError> {
    sqlx::query!(
      r#"
      INSERT INTO error_records
        (id, tenant_id, user_id, "timestamp", kind, message, stack_digest,
         endpoint, request_id, severity, resolved, notes)
      VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
      "#,
      r.id,
      r.tenant_id.0,
      r.user_id.map(|u| u.0),
      r.timestamp,
      r.kind,
      r.message,
      r.stack_digest,
      r.endpoint,
      r.request_id,
      format!("{:?}", r.severity).to_lowercase(),
      r.resolved,
      r.notes,
    )
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn usage_between(
    &self,
    tenant_id: TenantId,
    from: chrono::DateTime<chrono::Utc>,
    to: chrono::DateTime<chrono::Utc>,
  ) -> Result<Vec<UsageRecord>, CoreError> {
    let rows = sqlx::query_as!(
      UsageRow,
      r#"
      SELECT id, tenant_id, user_id, "timestamp", endpoint, method, model,
             request_bytes, response_bytes, latency_ms, status_code, client_ip, user_agent
      FROM usage_records
      WHERE tenant_id = $1 AND "timestamp" >= $2 AND "timestamp" < $3
      ORDER BY "timestamp" ASC
      "#,
      tenant_id.0,
      from,
      to
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
  }

  async fn upsert_hourly_stat(&self, s: &UsageStat) -> Result<(), CoreError> {
    upsert_stat(&self.pool, s).await
  }

  async fn upsert_daily_stat(&self, s: &UsageStat) -> Result<(), CoreError> {
    upsert_stat(&self.pool, s).await
  }

  async fn hourly_stats_for_day(&self, tenant_id: TenantId, date: NaiveDate) -> Result<Vec<UsageStat>, CoreError> {
    let rows = sqlx::query_as!(
      UsageStatRow,
      r#"
      SELECT tenant_id, date, hour, count, successes, failures, bytes_in, bytes_out,
             avg_latency_ms, unique_users, most_used_model, peak_hour
      FROM usage_stats
      WHERE tenant_id = $1 AND date = $2 AND hour IS NOT NULL
      ORDER BY hour ASC
      "#,
      tenant_id.0,
      date
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
  }

  async fn prune_usage_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64, CoreError> {
    let result = sqlx::query!("DELETE FROM usage_records WHERE \"timestamp\" < $1", cutoff)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected())
  }
}

async fn upsert_stat(pool: &PgPool, s: &UsageStat) -> Result<(), CoreError> {
  sqlx::query!(
    r#"
    INSERT INTO usage_stats
      (tenant_id, date, hour, count, successes, failures, bytes_in, bytes_out,
       avg_latency_ms, unique_users, most_used_model, peak_hour)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    ON CONFLICT (tenant_id, date, hour) DO UPDATE SET
      count = EXCLUDED.count,
      successes = EXCLUDED.successes,
      failures = EXCLUDED.failures,
      bytes_in = EXCLUDED.bytes_in,
      bytes_out = EXCLUDED.bytes_out,
      avg_latency_ms = EXCLUDED.avg_latency_ms,
      unique_users = EXCLUDED.unique_users,
      most_used_model = EXCLUDED.most_used_model,
      peak_hour = EXCLUDED.peak_hour
    "#,
    s.tenant_id.0,
    s.date,
    s.hour,
    s.count,
    s.successes,
    s.failures,
    s.bytes_in,
    s.bytes_out,
    s.avg_latency_ms,
    s.unique_users,
    s.most_used_model,
    s.peak_hour,
  )
  .execute(pool)
  .await?;
  Ok(())
}

struct UsageRow {
  id: uuid::Uuid,
  tenant_id: uuid::Uuid,
  user_id: Option<i64>,
  timestamp: chrono::DateTime<chrono::Utc>,
  endpoint: String,
  method: String,
  model: Option<String>,
  request_bytes: i64,
  response_bytes: i64,
  latency_ms: i64,
  status_code: i32,
  client_ip: Option<String>,
  user_agent: Option<String>,
}

impl From<UsageRow> for UsageRecord {
  fn from(r: UsageRow) -> Self {
    UsageRecord {
      id: r.id,
      tenant_id: TenantId(r.tenant_id),
      user_id: r.user_id.map(bridgecore_core::TenantUserId),
      timestamp: r.timestamp,
      endpoint: r.endpoint,
      method: r.method,
      model: r.model,
      request_bytes: r.request_bytes,
      response_bytes: r.response_bytes,
      latency_ms: r.latency_ms,
      status_code: r.status_code as u16,
      client_ip: r.client_ip,
      user_agent: r.user_agent,
    }
  }
}

struct UsageStatRow {
  tenant_id: uuid::Uuid,
  date: NaiveDate,
  hour: Option<i16>,
  count: i64,
  successes: i64,
  failures: i64,
  bytes_in: i64,
  bytes_out: i64,
  avg_latency_ms: f64,
  unique_users: i64,
  most_used_model: Option<String>,
  peak_hour: Option<i16>,
}

impl From<UsageStatRow> for UsageStat {
  fn from(r: UsageStatRow) -> Self {
    UsageStat {
      tenant_id: TenantId(r.tenant_id),
      date: r.date,
      hour: r.hour,
      count: r.count,
      successes: r.successes,
      failures: r.failures,
      bytes_in: r.bytes_in,
      bytes_out: r.bytes_out,
      avg_latency_ms: r.avg_latency_ms,
      unique_users: r.unique_users,
      most_used_model: r.most_used_model,
      peak_hour: r.peak_hour,
    }
  }
}

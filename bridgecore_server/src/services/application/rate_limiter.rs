//! Atomic hourly and daily request counters per tenant, backed by the
//! shared KV store's atomic INCR+EXPIRE.

use chrono::{DateTime, Timelike, Utc};

use bridgecore_core::{CoreError, TenantId};

use crate::services::infrastructure::KvStore;

const HOURLY_BUCKET_TTL_S: u64 = 3600;
const DAILY_BUCKET_TTL_S: u64 = 86400;

pub enum RateDecision {
  Allowed { remaining_hour: u64, remaining_day: u64 },
  Denied { retry_after_s: u64, scope: &'static str },
}

pub struct RateLimiter {
  kv: KvStore,
}

impl RateLimiter {
  pub fn new(kv: KvStore) -> Self {
    Self { kv }
  }

  fn hourly_key(tenant_id: TenantId, now: DateTime<Utc>) -> String {
    format!("rl:h:{}:{}", tenant_id, now.format("%Y%m%d%H"))
  }

  fn daily_key(tenant_id: TenantId, now: DateTime<Utc>) -> String {
    format!("rl:d:{}:{}", tenant_id, now.format("%Y%m%d"))
  }

  /// Increments both buckets unconditionally (the atomicity requirement is
  /// that the increment-and-compare is a single op against the KV so two
  /// concurrent requests never both slip past the boundary), then compares
  /// against the effective limits.
  pub async fn check(
    &self,
    tenant_id: TenantId,
    now: DateTime<Utc>,
    hourly_limit: u64,
    daily_limit: u64,
  ) -> Result<RateDecision, CoreError> {
    let hourly_count = self
      .kv
      .incr_with_expiry(&Self::hourly_key(tenant_id, now), HOURLY_BUCKET_TTL_S)
      .await
      .map_err(|e| CoreError::Internal(e.to_string()))?;
    let daily_count = self
      .kv
      .incr_with_expiry(&Self::daily_key(tenant_id, now), DAILY_BUCKET_TTL_S)
      .await
      .map_err(|e| CoreError::Internal(e.to_string()))?;

    let hourly_count = hourly_count.max(0) as u64;
    let daily_count = daily_count.max(0) as u64;

    if hourly_count > hourly_limit {
      let retry_after_s = seconds_to_next_hour(now);
      return Ok(RateDecision::Denied {
        retry_after_s,
        scope: "hourly",
      });
    }
    if daily_count > daily_limit {
      let retry_after_s = seconds_to_next_day(now);
      return Ok(RateDecision::Denied {
        retry_after_s,
        scope: "daily",
      });
    }

    Ok(RateDecision::Allowed {
      remaining_hour: hourly_limit.saturating_sub(hourly_count),
      remaining_day: daily_limit.saturating_sub(daily_count),
    })
  }
}

fn seconds_to_next_hour(now: DateTime<Utc>) -> u64 {
  let hour_start = now.date_naive().and_hms_opt(now.hour(), 0, 0).unwrap().and_utc();
  let next_hour_start = hour_start + chrono::Duration::hours(1);
  (next_hour_start - now).num_seconds().max(1) as u64
}

fn seconds_to_next_day(now: DateTime<Utc>) -> u64 {
  let tomorrow = now.date_naive() + chrono::Duration::days(1);
  let next_midnight = tomorrow.and_hms_opt(0, 0, 0).unwrap().and_utc();
  (next_midnight - now).num_seconds().max(1) as u64
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn retry_after_day_never_exceeds_86400() {
    let now = Utc::now();
    assert!(seconds_to_next_day(now) <= 86400);
  }

  #[test]
  fn retry_after_hour_never_exceeds_3600() {
    let now = Utc::now();
    assert!(seconds_to_next_hour(now) <= 3600);
  }
}

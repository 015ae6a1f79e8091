//! Read-through cache in front of the upstream session pool, for
//! read-shaped RPC operations only.

use serde::{Deserialize, Serialize};

use bridgecore_core::{cache_key, CoreError, TenantId, Value};

use crate::services::infrastructure::KvStore;

const DEFAULT_CACHE_TTL_S: u64 = 300;

#[derive(Serialize, Deserialize)]
struct CachedEntry {
  result: Value,
}

pub struct ReadThroughCache {
  kv: KvStore,
  ttl_s: u64,
}

impl ReadThroughCache {
  pub fn new(kv: KvStore, ttl_s: u64) -> Self {
    Self { kv, ttl_s }
  }

  pub fn default_ttl(kv: KvStore) -> Self {
    Self::new(kv, DEFAULT_CACHE_TTL_S)
  }

  /// The (tenant, model) prefix every entry for this pair is stored under,
  /// so a single SCAN+MATCH pattern delete can invalidate them all without
  /// knowing each entry's operation or payload ahead of time.
  fn model_prefix(tenant_id: TenantId, model: &str) -> String {
    format!("cache:{tenant_id}:{model}")
  }

  fn key(tenant_id: TenantId, operation: &str, model: &str, payload: &Value) -> String {
    let digest = cache_key(&tenant_id.to_string(), operation, model, payload);
    format!("{}:{}:{}", Self::model_prefix(tenant_id, model), operation, digest)
  }

  /// Returns a cached result if present, else `None` (a cache-miss). A
  /// failed upstream call must never reach this cache — callers only
  /// `store` on success.
  pub async fn get(
    &self,
    tenant_id: TenantId,
    operation: &str,
    model: &str,
    payload: &Value,
  ) -> Result<Option<Value>, CoreError> {
    let key = Self::key(tenant_id, operation, model, payload);
    let entry: Option<CachedEntry> = self
      .kv
      .get_json(&key)
      .await
      .map_err(|e| CoreError::Internal(e.to_string()))?;
    Ok(entry.map(|e| e.result))
  }

  pub async fn store(
    &self,
    tenant_id: TenantId,
    operation: &str,
    model: &str,
    payload: &Value,
    result: &Value,
  ) -> Result<(), CoreError> {
    let key = Self::key(tenant_id, operation, model, payload);
    self
      .kv
      .set_json(&key, &CachedEntry { result: result.clone() }, self.ttl_s)
      .await
      .map_err(|e| CoreError::Internal(e.to_string()))
  }

  /// Drops every cache entry for `(tenant_id, model)`, regardless of
  /// operation or payload. Must complete before the triggering write's
  /// response is returned.
  pub async fn invalidate(&self, tenant_id: TenantId, model: &str) -> Result<(), CoreError> {
    let pattern = format!("{}:*", Self::model_prefix(tenant_id, model));
    self
      .kv
      .del_pattern(&pattern)
      .await
      .map(|_| ())
      .map_err(|e| CoreError::Internal(e.to_string()))
  }
}

/// Operations served through the read-through cache; everything else is
/// write-shaped and always invalidates instead.
pub fn is_read_shaped(operation: &str) -> bool {
  matches!(
    operation,
    "search" | "search_read" | "read" | "search_count" | "fields_get" | "name_search" | "name_get"
  )
}

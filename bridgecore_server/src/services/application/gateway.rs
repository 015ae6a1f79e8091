//! Validates and dispatches one RPC call: operation whitelist, payload
//! shape, per-tenant model allowlist, then cache-or-upstream, then usage
//! recording.

use std::sync::Arc;

use bridgecore_core::{CoreError, TenantId, Value};

use crate::domains::registry::{Tenant, UpstreamConfig};
use crate::services::application::ledger::{Ledger, UsageEvent};
use crate::services::application::read_cache::{is_read_shaped, ReadThroughCache};
use crate::services::application::session_pool::UpstreamSessionPool;
use crate::services::infrastructure::observability::metrics::{CacheMetrics, RequestMetrics, UpstreamMetrics};

const ENUMERATED_OPERATIONS: &[&str] = &[
  "search",
  "search_read",
  "read",
  "search_count",
  "fields_get",
  "name_search",
  "name_get",
  "create",
  "write",
  "unlink",
  "call_kw",
];

pub struct RpcResponse {
  pub result: Value,
  pub cached: bool,
  pub tenant_id: TenantId,
}

pub struct RpcGateway {
  pool: Arc<UpstreamSessionPool>,
  cache: Arc<ReadThroughCache>,
  ledger: Arc<Ledger>,
}

impl RpcGateway {
  pub fn new(pool: Arc<UpstreamSessionPool>, cache: Arc<ReadThroughCache>, ledger: Arc<Ledger>) -> Self {
    Self { pool, cache, ledger }
  }

  pub async fn dispatch(
    &self,
    tenant: &Tenant,
    upstream: &UpstreamConfig,
    operation: &str,
    payload: Value,
  ) -> Result<RpcResponse, CoreError> {
    let started = std::time::Instant::now();
    let outcome = self.dispatch_inner(tenant, upstream, operation, &payload).await;
    let elapsed = started.elapsed();

    let status_code = outcome.as_ref().map(|_| 200).unwrap_or_else(|e| e.status_code());
    let tenant_tag = tenant.id.to_string();
    RequestMetrics::record(&tenant_tag, operation, status_code, elapsed);

    self.ledger.record_usage(UsageEvent {
      tenant_id: tenant.id,
      endpoint: format!("/api/v1/odoo/{operation}"),
      method: operation.to_string(),
      model: extract_model(&payload),
      status_code,
      latency_ms: elapsed.as_millis() as i64,
      request_bytes: 0,
      response_bytes: 0,
    });

    if let Err(e) = &outcome {
      self.ledger.record_error(tenant.id, operation, e);
      if let CoreError::UpstreamTimeout | CoreError::UpstreamUnreachable(_) | CoreError::UpstreamError(_) = e {
        UpstreamMetrics::error(&tenant_tag, e.kind_tag());
      }
    }

    outcome
  }

  async fn dispatch_inner(
    &self,
    tenant: &Tenant,
    upstream: &UpstreamConfig,
    operation: &str,
    payload: &Value,
  ) -> Result<RpcResponse, CoreError> {
    if !ENUMERATED_OPERATIONS.contains(&operation) {
      return Err(CoreError::UnknownOperation(operation.to_string()));
    }

    let model = extract_model(payload).ok_or_else(|| CoreError::InvalidPayload("missing `model`".to_string()))?;
    validate_payload(operation, payload)?;

    if !tenant.model_allowed(&model) {
      return Err(CoreError::ModelForbidden(model));
    }

    if is_read_shaped(operation) {
      if let Some(cached) = self.cache.get(tenant.id, operation, &model, payload).await? {
        CacheMetrics::hit();
        return Ok(RpcResponse {
          result: cached,
          cached: true,
          tenant_id: tenant.id,
        });
      }
      CacheMetrics::miss();

      let result = self.pool.call(tenant.id, upstream, operation, &model, payload).await?;
      self.cache.store(tenant.id, operation, &model, payload, &result).await?;
      Ok(RpcResponse {
        result,
        cached: false,
        tenant_id: tenant.id,
      })
    } else {
      let result = self.pool.call(tenant.id, upstream, operation, &model, payload).await?;
      self.cache.invalidate(tenant.id, &model).await?;
      Ok(RpcResponse {
        result,
        cached: false,
        tenant_id: tenant.id,
      })
    }
  }
}

fn extract_model(payload: &Value) -> Option<String> {
  payload
    .as_map()
    .and_then(|m| m.get("model"))
    .and_then(|v| v.as_str())
    .map(|s| s.to_string())
}

fn validate_payload(operation: &str, payload: &Value) -> Result<(), CoreError> {
  let map = payload
    .as_map()
    .ok_or_else(|| CoreError::InvalidPayload("payload must be an object".to_string()))?;

  if matches!(operation, "write" | "unlink") {
    let ids_empty = match map.get("ids") {
      Some(Value::List(ids)) => ids.is_empty(),
      Some(_) => return Err(CoreError::InvalidPayload("`ids` must be a list".to_string())),
      None => true,
    };
    if ids_empty {
      return Err(CoreError::InvalidPayload(
        "`ids` must be a non-empty list for write/unlink".to_string(),
      ));
    }
  }

  if let Some(fields) = map.get("fields") {
    match fields {
      Value::List(items) => {
        if !items.iter().all(|v| matches!(v, Value::String(_))) {
          return Err(CoreError::InvalidPayload("`fields` must be a list of strings".to_string()));
        }
      }
      _ => return Err(CoreError::InvalidPayload("`fields` must be a list".to_string())),
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn payload(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
  }

  #[test]
  fn enumerated_operations_excludes_unknown_verbs() {
    assert!(!ENUMERATED_OPERATIONS.contains(&"drop_table"));
    assert!(ENUMERATED_OPERATIONS.contains(&"call_kw"));
  }

  #[test]
  fn extract_model_reads_top_level_model_field() {
    let p = payload(vec![("model", Value::String("res.partner".to_string()))]);
    assert_eq!(extract_model(&p), Some("res.partner".to_string()));
  }

  #[test]
  fn extract_model_is_none_without_model_field() {
    let p = payload(vec![("ids", Value::List(vec![Value::Int(1)]))]);
    assert_eq!(extract_model(&p), None);
  }

  #[test]
  fn write_requires_non_empty_ids() {
    let empty = payload(vec![("ids", Value::List(vec![]))]);
    assert!(validate_payload("write", &empty).is_err());

    let missing = payload(vec![]);
    assert!(validate_payload("write", &missing).is_err());

    let present = payload(vec![("ids", Value::List(vec![Value::Int(7)]))]);
    assert!(validate_payload("write", &present).is_ok());
  }

  #[test]
  fn unlink_requires_non_empty_ids_too() {
    let empty = payload(vec![("ids", Value::List(vec![]))]);
    assert!(validate_payload("unlink", &empty).is_err());
  }

  #[test]
  fn search_does_not_require_ids() {
    let p = payload(vec![("model", Value::String("res.partner".to_string()))]);
    assert!(validate_payload("search", &p).is_ok());
  }

  #[test]
  fn fields_must_be_a_list_of_strings() {
    let bad_kind = payload(vec![("fields", Value::String("name".to_string()))]);
    assert!(validate_payload("read", &bad_kind).is_err());

    let bad_items = payload(vec![("fields", Value::List(vec![Value::Int(1)]))]);
    assert!(validate_payload("read", &bad_items).is_err());

    let good = payload(vec![("fields", Value::List(vec![Value::String("name".to_string())]))]);
    assert!(validate_payload("read", &good).is_ok());
  }

  #[test]
  fn payload_must_be_an_object() {
    assert!(validate_payload("search", &Value::Null).is_err());
    assert!(validate_payload("search", &Value::List(vec![])).is_err());
  }

  #[test]
  fn is_read_shaped_matches_only_the_enumerated_read_operations() {
    assert!(is_read_shaped("search_read"));
    assert!(is_read_shaped("fields_get"));
    assert!(!is_read_shaped("write"));
    assert!(!is_read_shaped("call_kw"));
  }
}

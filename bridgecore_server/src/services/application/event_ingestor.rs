//! Two symmetric ingest paths into the event store, both converging on the
//! same idempotent insert so the upstream event id is the sole ordering
//! authority regardless of which path delivered it first.

use std::sync::Arc;

use bridgecore_core::{CoreError, EventId, TenantId, Value};

use crate::domains::events::{ChangeKind, Event, EventRepository};
use crate::domains::registry::UpstreamConfig;
use crate::services::application::session_pool::UpstreamSessionPool;
use crate::services::infrastructure::observability::metrics::SyncMetrics;

const DEFAULT_PULL_BATCH_SIZE: u32 = 500;

pub struct EventIngestor {
  repo: Arc<dyn EventRepository>,
  pool: Arc<UpstreamSessionPool>,
}

impl EventIngestor {
  pub fn new(repo: Arc<dyn EventRepository>, pool: Arc<UpstreamSessionPool>) -> Self {
    Self { repo, pool }
  }

  /// Push-from-upstream: an authenticated webhook delivers one event
  /// payload; duplicates (by id) are idempotently ignored.
  pub async fn push(&self, tenant_id: TenantId, event: Event) -> Result<(), CoreError> {
    debug_assert_eq!(event.tenant_id, tenant_id);
    self.repo.ingest(&event).await?;
    SyncMetrics::ingested(&tenant_id.to_string(), 1);
    Ok(())
  }

  /// Pull-from-upstream: asks the tenant's upstream for events with id
  /// greater than the maximum id already stored, up to a bounded batch.
  pub async fn pull(&self, tenant_id: TenantId, upstream: &UpstreamConfig) -> Result<u32, CoreError> {
    let since = self.repo.max_id(tenant_id).await?.unwrap_or(EventId(0));

    let request = Value::Map(std::collections::BTreeMap::from([
      ("since_event_id".to_string(), Value::Int(since.0)),
      ("limit".to_string(), Value::Int(DEFAULT_PULL_BATCH_SIZE as i64)),
    ]));

    let response = self
      .pool
      .call(tenant_id, upstream, "events.poll", "bridgecore.event", &request)
      .await?;

    let events = parse_events(tenant_id, &response)?;
    let count = events.len() as u32;
    for event in events {
      self.repo.ingest(&event).await?;
    }
    if count > 0 {
      SyncMetrics::ingested(&tenant_id.to_string(), count as u64);
    }
    Ok(count)
  }
}

fn parse_events(tenant_id: TenantId, response: &Value) -> Result<Vec<Event>, CoreError> {
  let list = response
    .as_map()
    .and_then(|m| m.get("events"))
    .and_then(|v| v.as_list())
    .ok_or_else(|| CoreError::UpstreamError("malformed event poll response".to_string()))?;

  list.iter().map(|raw| parse_one_event(tenant_id, raw)).collect()
}

fn parse_one_event(tenant_id: TenantId, raw: &Value) -> Result<Event, CoreError> {
  let map = raw
    .as_map()
    .ok_or_else(|| CoreError::UpstreamError("event entry is not an object".to_string()))?;

  let id = map
    .get("id")
    .and_then(as_int)
    .ok_or_else(|| CoreError::UpstreamError("event missing `id`".to_string()))?;
  let model = map
    .get("model")
    .and_then(|v| v.as_str())
    .ok_or_else(|| CoreError::UpstreamError("event missing `model`".to_string()))?
    .to_string();
  let record_id = map
    .get("record_id")
    .and_then(as_int)
    .ok_or_else(|| CoreError::UpstreamError("event missing `record_id`".to_string()))?;
  let change_kind = match map.get("change_kind").and_then(|v| v.as_str()) {
    Some("create") => ChangeKind::Create,
    Some("write") => ChangeKind::Write,
    Some("unlink") => ChangeKind::Unlink,
    _ => return Err(CoreError::UpstreamError("event has unknown change_kind".to_string())),
  };
  let priority = map.get("priority").and_then(|v| v.as_str()).map(|s| s.to_string());
  let payload = map.get("payload").cloned();

  Ok(Event {
    id: EventId(id),
    tenant_id,
    model,
    record_id,
    change_kind,
    server_timestamp: chrono::Utc::now(),
    payload,
    priority,
  })
}

fn as_int(v: &Value) -> Option<i64> {
  match v {
    Value::Int(i) => Some(*i),
    Value::Float(f) => Some(*f as i64),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  fn event_value(id: i64, model: &str, record_id: i64, change_kind: &str) -> Value {
    Value::Map(std::collections::BTreeMap::from([
      ("id".to_string(), Value::Int(id)),
      ("model".to_string(), Value::String(model.to_string())),
      ("record_id".to_string(), Value::Int(record_id)),
      ("change_kind".to_string(), Value::String(change_kind.to_string())),
    ]))
  }

  fn poll_response(events: Vec<Value>) -> Value {
    Value::Map(std::collections::BTreeMap::from([(
      "events".to_string(),
      Value::List(events),
    )]))
  }

  #[test]
  fn parses_a_well_formed_event_batch() {
    let tenant_id = TenantId(Uuid::new_v4());
    let response = poll_response(vec![
      event_value(1, "res.partner", 42, "create"),
      event_value(2, "sale.order", 7, "write"),
    ]);

    let events = parse_events(tenant_id, &response).expect("should parse");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, EventId(1));
    assert_eq!(events[0].model, "res.partner");
    assert_eq!(events[0].change_kind, ChangeKind::Create);
    assert_eq!(events[1].change_kind, ChangeKind::Write);
    assert!(events.iter().all(|e| e.tenant_id == tenant_id));
  }

  #[test]
  fn rejects_response_missing_events_key() {
    let tenant_id = TenantId(Uuid::new_v4());
    let response = Value::Map(std::collections::BTreeMap::new());
    assert!(parse_events(tenant_id, &response).is_err());
  }

  #[test]
  fn rejects_event_with_unknown_change_kind() {
    let tenant_id = TenantId(Uuid::new_v4());
    let response = poll_response(vec![event_value(1, "res.partner", 42, "archive")]);
    assert!(parse_events(tenant_id, &response).is_err());
  }

  #[test]
  fn rejects_event_missing_required_field() {
    let tenant_id = TenantId(Uuid::new_v4());
    let mut bad = event_value(1, "res.partner", 42, "create");
    if let Value::Map(m) = &mut bad {
      m.remove("record_id");
    }
    let response = poll_response(vec![bad]);
    assert!(parse_events(tenant_id, &response).is_err());
  }
}

//! Append-only usage and error logging, off the request path: the gateway
//! enqueues, a fixed pool of writers drains and persists, and overflow
//! drops the oldest pending record rather than blocking a caller.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use bridgecore_core::{CoreError, TenantId, TenantUserId};

use crate::domains::usage::{ErrorRecord, UsageRecord, UsageRepository};
use crate::services::infrastructure::observability::metrics::QueueMetrics;

const QUEUE_LABEL: &str = "usage";

pub struct UsageEvent {
  pub tenant_id: TenantId,
  pub endpoint: String,
  pub method: String,
  pub model: Option<String>,
  pub status_code: u16,
  pub latency_ms: i64,
  pub request_bytes: i64,
  pub response_bytes: i64,
}

enum LedgerEntry {
  Usage(UsageRecord),
  Error(ErrorRecord),
}

struct Queue {
  entries: Mutex<VecDeque<LedgerEntry>>,
  capacity: usize,
  notify: Notify,
}

/// Non-blocking front door onto the ledger queue. `record_usage` and
/// `record_error` never await anything that can block the request path:
/// a full queue drops the oldest pending entry instead, incrementing
/// `dropped_records`.
pub struct Ledger {
  queue: Arc<Queue>,
  dropped_records: Arc<AtomicU64>,
}

impl Ledger {
  pub fn spawn(repo: Arc<dyn UsageRepository>, queue_depth: usize, writer_count: usize) -> Self {
    let queue = Arc::new(Queue {
      entries: Mutex::new(VecDeque::with_capacity(queue_depth)),
      capacity: queue_depth,
      notify: Notify::new(),
    });
    let dropped_records = Arc::new(AtomicU64::new(0));

    for _ in 0..writer_count.max(1) {
      let repo = repo.clone();
      let queue = queue.clone();
      tokio::spawn(async move {
        loop {
          let entry = {
            let mut guard = queue.entries.lock().await;
            match guard.pop_front() {
              Some(e) => Some(e),
              None => {
                drop(guard);
                queue.notify.notified().await;
                continue;
              }
            }
          };
          match entry {
            Some(LedgerEntry::Usage(record)) => {
              if let Err(e) = repo.insert_usage(&record).await {
                tracing::warn!(error = %e, "failed to persist usage record");
              }
            }
            Some(LedgerEntry::Error(record)) => {
              if let Err(e) = repo.insert_error(&record).await {
                tracing::warn!(error = %e, "failed to persist error record");
              }
            }
            None => {}
          }
        }
      });
    }

    Self { queue, dropped_records }
  }

  pub fn dropped_records(&self) -> u64 {
    self.dropped_records.load(Ordering::Relaxed)
  }

  pub fn record_usage(&self, event: UsageEvent) {
    let record = UsageRecord {
      id: Uuid::new_v4(),
      tenant_id: event.tenant_id,
      user_id: None,
      timestamp: Utc::now(),
      endpoint: event.endpoint,
      method: event.method,
      model: event.model,
      request_bytes: event.request_bytes,
      response_bytes: event.response_bytes,
      latency_ms: event.latency_ms,
      status_code: event.status_code,
      client_ip: None,
      user_agent: None,
    };
    self.enqueue(LedgerEntry::Usage(record));
  }

  pub fn record_usage_for_user(&self, event: UsageEvent, user_id: TenantUserId) {
    let record = UsageRecord {
      id: Uuid::new_v4(),
      tenant_id: event.tenant_id,
      user_id: Some(user_id),
      timestamp: Utc::now(),
      endpoint: event.endpoint,
      method: event.method,
      model: event.model,
      request_bytes: event.request_bytes,
      response_bytes: event.response_bytes,
      latency_ms: event.latency_ms,
      status_code: event.status_code,
      client_ip: None,
      user_agent: None,
    };
    self.enqueue(LedgerEntry::Usage(record));
  }

  /// `RateLimited` is expected back-pressure, not a fault — it has no
  /// severity and is never filed as an `ErrorRecord`, only counted in
  /// metrics.
  pub fn record_error(&self, tenant_id: TenantId, endpoint: &str, error: &CoreError) {
    let Some(severity) = error.severity() else {
      return;
    };
    let record = ErrorRecord {
      id: Uuid::new_v4(),
      tenant_id,
      user_id: None,
      timestamp: Utc::now(),
      kind: error.kind_tag().to_string(),
      message: error.to_string(),
      stack_digest: None,
      endpoint: endpoint.to_string(),
      request_id: Uuid::new_v4().to_string(),
      severity,
      resolved: false,
      notes: None,
    };
    self.enqueue(LedgerEntry::Error(record));
  }

  fn enqueue(&self, entry: LedgerEntry) {
    let Ok(mut guard) = self.queue.entries.try_lock() else {
      // Another producer is mid-push; fall back to dropping this record
      // rather than blocking the request path waiting for the lock.
      self.dropped_records.fetch_add(1, Ordering::Relaxed);
      QueueMetrics::dropped(QUEUE_LABEL);
      return;
    };
    if guard.len() >= self.queue.capacity {
      guard.pop_front();
      self.dropped_records.fetch_add(1, Ordering::Relaxed);
      QueueMetrics::dropped(QUEUE_LABEL);
    }
    guard.push_back(entry);
    QueueMetrics::depth(QUEUE_LABEL, guard.len());
    drop(guard);
    self.queue.notify.notify_one();
  }
}

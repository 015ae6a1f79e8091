//! One logical upstream session handle per tenant, with lazy authentication
//! and reauth-on-expiry.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use bridgecore_core::{CoreError, TenantId, Value};

use crate::domains::registry::UpstreamConfig;
use crate::services::infrastructure::observability::metrics::UpstreamMetrics;

#[derive(Debug, Clone)]
struct SessionHandle {
  token: String,
  created_at: Instant,
  last_used: Instant,
}

struct TenantSlot {
  handle: Mutex<Option<SessionHandle>>,
}

/// `call(tenant, operation, payload) -> result`, reauthenticating
/// transparently when the upstream reports the session has expired.
///
/// Concurrency: many in-flight calls per tenant are allowed; only the
/// authenticate-and-store step is serialized, via the per-tenant mutex
/// guarding that tenant's slot, so concurrent callers don't thunder the
/// upstream with parallel logins.
pub struct UpstreamSessionPool {
  http: reqwest::Client,
  slots: DashMap<TenantId, Arc<TenantSlot>>,
  idle_ttl: Duration,
}

impl UpstreamSessionPool {
  pub fn new(request_timeout: Duration, idle_ttl: Duration) -> Result<Self, CoreError> {
    let http = reqwest::Client::builder()
      .timeout(request_timeout)
      .build()
      .map_err(|e| CoreError::Internal(format!("failed to build upstream http client: {e}")))?;

    Ok(Self {
      http,
      slots: DashMap::new(),
      idle_ttl,
    })
  }

  fn slot_for(&self, tenant_id: TenantId) -> Arc<TenantSlot> {
    self
      .slots
      .entry(tenant_id)
      .or_insert_with(|| {
        Arc::new(TenantSlot {
          handle: Mutex::new(None),
        })
      })
      .clone()
  }

  pub async fn call(
    &self,
    tenant_id: TenantId,
    upstream: &UpstreamConfig,
    operation: &str,
    model: &str,
    payload: &Value,
  ) -> Result<Value, CoreError> {
    let slot = self.slot_for(tenant_id);

    let token = {
      let mut guard = slot.handle.lock().await;
      match guard.as_ref() {
        Some(h) => h.token.clone(),
        None => {
          let handle = self.authenticate(upstream).await?;
          let token = handle.token.clone();
          *guard = Some(handle);
          token
        }
      }
    };

    match self.invoke(upstream, &token, operation, model, payload).await {
      Ok(result) => {
        self.touch(&slot).await;
        Ok(result)
      }
      Err(CoreError::UpstreamAuthFailed(_)) => {
        UpstreamMetrics::error(&tenant_id.to_string(), "session_expired");
        let mut guard = slot.handle.lock().await;
        *guard = None;
        let handle = self.authenticate(upstream).await?;
        let token = handle.token.clone();
        *guard = Some(handle);
        drop(guard);
        let result = self.invoke(upstream, &token, operation, model, payload).await?;
        self.touch(&slot).await;
        Ok(result)
      }
      Err(other) => Err(other),
    }
  }

  async fn touch(&self, slot: &Arc<TenantSlot>) {
    if let Some(h) = slot.handle.lock().await.as_mut() {
      h.last_used = Instant::now();
    }
  }

  async fn authenticate(&self, upstream: &UpstreamConfig) -> Result<SessionHandle, CoreError> {
    let req = AuthenticateRequest {
      db: upstream.database.clone(),
      login: upstream.username.clone(),
      password: upstream.password.clone(),
    };

    let resp = self
      .http
      .post(format!("{}/web/session/authenticate", upstream.base_url))
      .json(&req)
      .send()
      .await
      .map_err(map_reqwest_err)?;

    if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 {
      return Err(CoreError::UpstreamAuthFailed(
        "upstream rejected tenant credentials".to_string(),
      ));
    }
    if !resp.status().is_success() {
      return Err(CoreError::UpstreamError(format!(
        "authenticate failed with status {}",
        resp.status()
      )));
    }

    let body: AuthenticateResponse = resp.json().await.map_err(map_reqwest_err)?;
    Ok(SessionHandle {
      token: body.session_id,
      created_at: Instant::now(),
      last_used: Instant::now(),
    })
  }

  async fn invoke(
    &self,
    upstream: &UpstreamConfig,
    session_token: &str,
    operation: &str,
    model: &str,
    payload: &Value,
  ) -> Result<Value, CoreError> {
    let req = CallRequest {
      model: model.to_string(),
      method: operation.to_string(),
      params: payload.clone(),
    };

    let resp = self
      .http
      .post(format!("{}/web/dataset/call_kw", upstream.base_url))
      .header("X-Bridgecore-Session", session_token)
      .json(&req)
      .send()
      .await
      .map_err(map_reqwest_err)?;

    if resp.status().as_u16() == 401 {
      return Err(CoreError::UpstreamAuthFailed("upstream session expired".to_string()));
    }
    if !resp.status().is_success() {
      return Err(CoreError::UpstreamError(format!(
        "{} returned status {}",
        operation,
        resp.status()
      )));
    }

    let body: serde_json::Value = resp.json().await.map_err(map_reqwest_err)?;
    Ok(Value::from(body))
  }

  /// Evicts handles idle beyond the configured idle TTL; intended to be
  /// driven by the scheduler's periodic sweep.
  pub async fn evict_idle(&self) {
    let now = Instant::now();
    for entry in self.slots.iter() {
      let mut guard = entry.value().handle.lock().await;
      if let Some(h) = guard.as_ref() {
        if now.duration_since(h.last_used) > self.idle_ttl {
          *guard = None;
        }
      }
    }
  }
}

fn map_reqwest_err(e: reqwest::Error) -> CoreError {
  if e.is_timeout() {
    CoreError::UpstreamTimeout
  } else if e.is_connect() {
    CoreError::UpstreamUnreachable(e.to_string())
  } else {
    CoreError::UpstreamError(e.to_string())
  }
}

#[derive(Serialize)]
struct AuthenticateRequest {
  db: String,
  login: String,
  password: String,
}

#[derive(Deserialize)]
struct AuthenticateResponse {
  session_id: String,
}

#[derive(Serialize)]
struct CallRequest {
  model: String,
  method: String,
  params: Value,
}

//! The ordered sequence of checks applied to every client-plane request:
//! auth, tenant resolve, status gate, rate check, context attach.
//!
//! Ordering is contractual: auth failures return before tenant status;
//! tenant status returns before rate decisions, so a suspended tenant is
//! never charged against its rate counters.

use std::sync::Arc;
use uuid::Uuid;

use sha2::{Digest, Sha256};

use bridgecore_core::{CoreError, TenantUserId, TokenKind, TokenManager};

use crate::domains::registry::{Tenant, TenantRegistry, TenantUserRole, UpstreamConfig};
use crate::services::application::rate_limiter::{RateDecision, RateLimiter};
use crate::services::infrastructure::observability::metrics::RateLimitMetrics;
use crate::services::infrastructure::KvStore;

fn revocation_key(token: &str) -> String {
  let digest = Sha256::digest(token.as_bytes());
  format!("revoked:{}", hex::encode(digest))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
  Admin,
  User,
}

impl From<TenantUserRole> for CallerRole {
  fn from(r: TenantUserRole) -> Self {
    match r {
      TenantUserRole::Admin => CallerRole::Admin,
      TenantUserRole::User => CallerRole::User,
    }
  }
}

/// Immutable per-request context assembled by the admission pipeline and
/// threaded down to the gateway and sync engine. Nothing downstream
/// mutates it in place; a step that needs to change something derives a
/// new context instead.
#[derive(Clone)]
pub struct RequestContext {
  pub request_id: Uuid,
  pub tenant: Arc<Tenant>,
  pub user_id: TenantUserId,
  pub role: CallerRole,
}

pub struct AdmissionPipeline {
  registry: Arc<TenantRegistry>,
  rate_limiter: Arc<RateLimiter>,
  tenant_tokens: TokenManager,
  kv: KvStore,
}

impl AdmissionPipeline {
  pub fn new(registry: Arc<TenantRegistry>, rate_limiter: Arc<RateLimiter>, tenant_tokens: TokenManager, kv: KvStore) -> Self {
    Self {
      registry,
      rate_limiter,
      tenant_tokens,
      kv,
    }
  }

  /// Blacklists a token for the remainder of its lifetime so a logged-out
  /// access or refresh token is rejected even though its signature and
  /// expiry both still check out.
  pub async fn revoke(&self, token: &str, remaining_ttl_s: u64) -> Result<(), CoreError> {
    self
      .kv
      .set_json(&revocation_key(token), &true, remaining_ttl_s.max(1))
      .await
      .map_err(|e| CoreError::Internal(e.to_string()))
  }

  async fn is_revoked(&self, token: &str) -> Result<bool, CoreError> {
    let hit: Option<bool> = self
      .kv
      .get_json(&revocation_key(token))
      .await
      .map_err(|e| CoreError::Internal(e.to_string()))?;
    Ok(hit.unwrap_or(false))
  }

  /// Runs steps 1-4. Step 5 (context attach) is represented by the
  /// returned `RequestContext` itself.
  pub async fn admit(&self, bearer_token: Option<&str>) -> Result<RequestContext, CoreError> {
    let token = bearer_token.ok_or(CoreError::MissingToken)?;
    if self.is_revoked(token).await? {
      return Err(CoreError::InvalidToken("token has been revoked".to_string()));
    }
    let claims = self.tenant_tokens.verify_tenant_token(token, TokenKind::Access)?;

    let tenant = self.registry.resolve_by_id(claims.tenant_id).await?;
    if !tenant.status.admits_requests() {
      return Err(if tenant.status == crate::domains::registry::TenantStatus::Deleted {
        CoreError::TenantDeleted
      } else {
        CoreError::TenantSuspended
      });
    }

    let registry = self.registry.clone();
    let tenant_id = tenant.id;
    tokio::spawn(async move {
      registry.touch_last_activity(tenant_id).await;
    });

    let plan = self.registry.plan_for(&tenant).await?;
    let hourly_limit = tenant.effective_hourly_limit(&plan);
    let daily_limit = tenant.effective_daily_limit(&plan);

    match self
      .rate_limiter
      .check(tenant.id, chrono::Utc::now(), hourly_limit, daily_limit)
      .await?
    {
      RateDecision::Allowed { .. } => {}
      RateDecision::Denied { retry_after_s, scope } => {
        RateLimitMetrics::denied(&tenant.id.to_string(), scope);
        return Err(CoreError::RateLimited {
          retry_after_s,
          scope: scope.to_string(),
        });
      }
    }

    Ok(RequestContext {
      request_id: Uuid::new_v4(),
      tenant: Arc::new(tenant),
      user_id: claims.sub,
      role: match claims.role {
        bridgecore_core::jwt::TenantRole::Admin => CallerRole::Admin,
        bridgecore_core::jwt::TenantRole::User => CallerRole::User,
      },
    })
  }

  pub fn upstream_config(&self, tenant: &Tenant) -> Result<UpstreamConfig, CoreError> {
    self.registry.upstream_config(tenant)
  }
}

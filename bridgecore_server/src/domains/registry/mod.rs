//! Authoritative, read-mostly record of tenants, plans, and tenant-users.
//! Hot-cached in memory with a short TTL; every admin-plane mutation
//! publishes an invalidation the registry consumes to drop its cache entry.

pub mod repository;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use bridgecore_core::{CoreError, CredentialVault, PlanId, TenantId, TenantUserId};

pub use repository::{PgTenantRepository, TenantRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
  Trial,
  Active,
  Suspended,
  Deleted,
}

impl TenantStatus {
  /// Deleted and suspended tenants never admit requests.
  pub fn admits_requests(self) -> bool {
    matches!(self, TenantStatus::Trial | TenantStatus::Active)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TenantUserRole {
  Admin,
  User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
  pub id: PlanId,
  pub name: String,
  pub daily_quota: u64,
  pub hourly_quota: u64,
  pub max_tenant_users: u32,
  pub feature_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
  pub id: TenantId,
  pub slug: String,
  pub contact_email: String,

  pub upstream_base_url: String,
  pub upstream_database: String,
  pub upstream_username: String,
  pub upstream_password_ciphertext: String,
  pub upstream_version: Option<String>,

  pub plan_id: PlanId,
  pub hourly_limit_override: Option<u64>,
  pub daily_limit_override: Option<u64>,
  pub allowed_operations: Vec<String>,
  pub allowed_models: Vec<String>,
  pub allowed_features: Vec<String>,

  pub status: TenantStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub last_activity: Option<DateTime<Utc>>,
}

impl Tenant {
  pub fn effective_hourly_limit(&self, plan: &Plan) -> u64 {
    self.hourly_limit_override.unwrap_or(plan.hourly_quota)
  }

  pub fn effective_daily_limit(&self, plan: &Plan) -> u64 {
    self.daily_limit_override.unwrap_or(plan.daily_quota)
  }

  /// An empty `allowed_models` set means unrestricted.
  pub fn model_allowed(&self, model: &str) -> bool {
    self.allowed_models.is_empty() || self.allowed_models.iter().any(|m| m == model)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantUser {
  pub id: TenantUserId,
  pub tenant_id: TenantId,
  pub email: String,
  pub password_hash: String,
  pub role: TenantUserRole,
  pub upstream_user_id: Option<i64>,
  pub active: bool,
}

/// Fully resolved upstream connection details, after the vault has opened
/// the stored password.
pub struct UpstreamConfig {
  pub base_url: String,
  pub database: String,
  pub username: String,
  pub password: String,
  pub version: Option<String>,
}

struct CacheEntry {
  tenant: Tenant,
  inserted_at: Instant,
}

const TENANT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Read-mostly facade over the tenant repository, with a short-TTL,
/// invalidation-driven in-memory cache.
///
/// Concurrency: single-writer (the invalidation handler) / multi-reader,
/// backstopped by the TTL so a missed invalidation self-heals within 30s.
pub struct TenantRegistry {
  repo: Arc<dyn TenantRepository>,
  vault: Arc<dyn CredentialVault>,
  cache: DashMap<TenantId, CacheEntry>,
}

impl TenantRegistry {
  pub fn new(repo: Arc<dyn TenantRepository>, vault: Arc<dyn CredentialVault>) -> Self {
    Self {
      repo,
      vault,
      cache: DashMap::new(),
    }
  }

  pub async fn resolve_by_id(&self, tenant_id: TenantId) -> Result<Tenant, CoreError> {
    if let Some(entry) = self.cache.get(&tenant_id) {
      if entry.inserted_at.elapsed() < TENANT_CACHE_TTL {
        return Ok(entry.tenant.clone());
      }
    }

    let tenant = self
      .repo
      .find_by_id(tenant_id)
      .await?
      .ok_or(CoreError::TenantUnknown)?;

    self.cache.insert(
      tenant_id,
      CacheEntry {
        tenant: tenant.clone(),
        inserted_at: Instant::now(),
      },
    );
    Ok(tenant)
  }

  pub async fn plan_for(&self, tenant: &Tenant) -> Result<Plan, CoreError> {
    self
      .repo
      .find_plan(tenant.plan_id)
      .await?
      .ok_or_else(|| CoreError::Internal(format!("plan {} missing for tenant {}", tenant.plan_id, tenant.id)))
  }

  /// Looks up a tenant user by email (scoped to a slug if one was given,
  /// else globally unique), verifies the password, and returns the user
  /// alongside its tenant.
  pub async fn resolve_user(
    &self,
    email: &str,
    tenant_slug: Option<&str>,
    password: &str,
  ) -> Result<(TenantUser, Tenant), CoreError> {
    let (user, tenant) = self
      .repo
      .find_user_by_email(email, tenant_slug)
      .await?
      .ok_or(CoreError::AuthFailed)?;

    if !user.active {
      return Err(CoreError::UserInactive);
    }

    let parsed_hash = PasswordHash::new(&user.password_hash)
      .map_err(|e| CoreError::Internal(format!("corrupt password hash: {e}")))?;
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed_hash)
      .map_err(|_| CoreError::AuthFailed)?;

    Ok((user, tenant))
  }

  /// Opens the vault-sealed password so the session pool can authenticate
  /// against the tenant's upstream.
  pub fn upstream_config(&self, tenant: &Tenant) -> Result<UpstreamConfig, CoreError> {
    let password = self.vault.open(&tenant.upstream_password_ciphertext)?;
    Ok(UpstreamConfig {
      base_url: tenant.upstream_base_url.clone(),
      database: tenant.upstream_database.clone(),
      username: tenant.upstream_username.clone(),
      password,
      version: tenant.upstream_version.clone(),
    })
  }

  /// Consumed by the admin-plane invalidation channel: every admin
  /// mutation publishes an invalidation event the registry consumes to
  /// drop its cache entry.
  pub fn invalidate(&self, tenant_id: TenantId) {
    self.cache.remove(&tenant_id);
  }

  pub async fn touch_last_activity(&self, tenant_id: TenantId) {
    // Fire-and-forget; a missed touch only affects an observability field.
    if let Err(e) = self.repo.touch_last_activity(tenant_id, Utc::now()).await {
      tracing::warn!(%tenant_id, error = %e, "failed to touch tenant last_activity");
    }
  }
}

pub fn hash_password(password: &str) -> Result<String, CoreError> {
  let salt = SaltString::generate(OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| CoreError::Internal(e.to_string()))
}

pub fn new_tenant_id() -> TenantId {
  TenantId(Uuid::new_v4())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn suspended_and_deleted_tenants_never_admit_requests() {
    assert!(TenantStatus::Active.admits_requests());
    assert!(TenantStatus::Trial.admits_requests());
    assert!(!TenantStatus::Suspended.admits_requests());
    assert!(!TenantStatus::Deleted.admits_requests());
  }

  #[test]
  fn empty_allowed_models_means_unrestricted() {
    let tenant = sample_tenant(vec![]);
    assert!(tenant.model_allowed("sale.order"));
  }

  #[test]
  fn non_empty_allowed_models_restricts() {
    let tenant = sample_tenant(vec!["res.partner".to_string()]);
    assert!(tenant.model_allowed("res.partner"));
    assert!(!tenant.model_allowed("sale.order"));
  }

  fn sample_tenant(allowed_models: Vec<String>) -> Tenant {
    Tenant {
      id: TenantId(Uuid::new_v4()),
      slug: "acme".into(),
      contact_email: "ops@acme.test".into(),
      upstream_base_url: "https://acme.example.com".into(),
      upstream_database: "acme".into(),
      upstream_username: "svc".into(),
      upstream_password_ciphertext: "ct".into(),
      upstream_version: None,
      plan_id: PlanId(Uuid::new_v4()),
      hourly_limit_override: None,
      daily_limit_override: None,
      allowed_operations: vec![],
      allowed_models,
      allowed_features: vec![],
      status: TenantStatus::Active,
      created_at: Utc::now(),
      updated_at: Utc::now(),
      last_activity: None,
    }
  }
}

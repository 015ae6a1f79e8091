use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use bridgecore_core::{CoreError, PlanId, TenantId};

use super::{Plan, Tenant, TenantUser};

#[async_trait]
pub trait TenantRepository: Send + Sync {
  async fn find_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>, CoreError>;
  async fn find_plan(&self, plan_id: PlanId) -> Result<Option<Plan>, CoreError>;
  async fn find_user_by_email(
    &self,
    email: &str,
    tenant_slug: Option<&str>,
  ) -> Result<Option<(TenantUser, Tenant)>, CoreError>;
  async fn touch_last_activity(&self, tenant_id: TenantId, at: DateTime<Utc>) -> Result<(), CoreError>;

  /// Every tenant id, used by the scheduler's retention sweep to iterate
  /// tenants without a bespoke cross-tenant query per job.
  async fn list_tenant_ids(&self) -> Result<Vec<TenantId>, CoreError>;

  // -- Admin-plane write contract ------------------------------------------
  //
  // The admin CRUD surface itself (an HTTP API, a dashboard) is out of
  // scope for this core; what the core owns is this read/write contract
  // against the same registry it reads from, so an external management
  // plane has somewhere concrete to write admin mutations, and the
  // `TenantRegistry`'s invalidation handler has somewhere concrete to
  // react to afterwards.

  async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), CoreError>;
  async fn set_status(&self, tenant_id: TenantId, status: super::TenantStatus) -> Result<(), CoreError>;
  async fn insert_tenant_user(&self, user: &TenantUser) -> Result<(), CoreError>;
}

pub struct PgTenantRepository {
  pool: PgPool,
}

impl PgTenantRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
  async fn find_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>, CoreError> {
    let row = sqlx::query_as!(
      TenantRow,
      r#"
      SELECT id, slug, contact_email, upstream_base_url, upstream_database,
             upstream_username, upstream_password_ciphertext, upstream_version,
             plan_id, hourly_limit_override, daily_limit_override,
             allowed_operations, allowed_models, allowed_features,
             status as "status: _", created_at, updated_at, last_activity
      FROM tenants WHERE id = $1
      "#,
      tenant_id.0
    )
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(Into::into))
  }

  async fn find_plan(&self, plan_id: PlanId) -> Result<Option<Plan>, CoreError> {
    let row = sqlx::query_as!(
      PlanRow,
      r#"
      SELECT id, name, daily_quota, hourly_quota, max_tenant_users, feature_flags
      FROM plans WHERE id = $1
      "#,
      plan_id.0
    )
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(Into::into))
  }

  async fn find_user_by_email(
    &self,
    email: &str,
    tenant_slug: Option<&str>,
  ) -> Result<Option<(TenantUser, Tenant)>, CoreError> {
    let row = if let Some(slug) = tenant_slug {
      sqlx::query_as!(
        UserWithTenantRow,
        r#"
        SELECT u.id as user_id, u.tenant_id, u.email as user_email, u.password_hash,
               u.role as "role: _", u.upstream_user_id, u.active,
               t.slug, t.contact_email, t.upstream_base_url, t.upstream_database,
               t.upstream_username, t.upstream_password_ciphertext, t.upstream_version,
               t.plan_id, t.hourly_limit_override, t.daily_limit_override,
               t.allowed_operations, t.allowed_models, t.allowed_features,
               t.status as "status: _", t.created_at, t.updated_at, t.last_activity
        FROM tenant_users u
        JOIN tenants t ON t.id = u.tenant_id
        WHERE u.email = $1 AND t.slug = $2
        "#,
        email,
        slug
      )
      .fetch_optional(&self.pool)
      .await?
    } else {
      sqlx::query_as!(
        UserWithTenantRow,
        r#"
        SELECT u.id as user_id, u.tenant_id, u.email as user_email, u.password_hash,
               u.role as "role: _", u.upstream_user_id, u.active,
               t.slug, t.contact_email, t.upstream_base_url, t.upstream_database,
               t.upstream_username, t.upstream_password_ciphertext, t.upstream_version,
               t.plan_id, t.hourly_limit_override, t.daily_limit_override,
               t.allowed_operations, t.allowed_models, t.allowed_features,
               t.status as "status: _", t.created_at, t.updated_at, t.last_activity
        FROM tenant_users u
        JOIN tenants t ON t.id = u.tenant_id
        WHERE u.email = $1
        "#,
        email
      )
      .fetch_optional(&self.pool)
      .await?
    };

    Ok(row.map(Into::into))
  }

  async fn touch_last_activity(&self, tenant_id: TenantId, at: DateTime<Utc>) -> Result<(), CoreError> {
    sqlx::query!("UPDATE tenants SET last_activity = $1 WHERE id = $2", at, tenant_id.0)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn list_tenant_ids(&self) -> Result<Vec<TenantId>, CoreError> {
    let rows = sqlx::query!("SELECT id FROM tenants WHERE status != 'deleted'")
      .fetch_all(&self.pool)
      .await?;
    Ok(rows.into_iter().map(|r| TenantId(r.id)).collect())
  }

  async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), CoreError> {
    sqlx::query!(
      r#"
      INSERT INTO tenants
        (id, slug, contact_email, upstream_base_url, upstream_database, upstream_username,
         upstream_password_ciphertext, upstream_version, plan_id, hourly_limit_override,
         daily_limit_override, allowed_operations, allowed_models, allowed_features,
         status, created_at, updated_at, last_activity)
      VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
      "#,
      tenant.id.0,
      tenant.slug,
      tenant.contact_email,
      tenant.upstream_base_url,
      tenant.upstream_database,
      tenant.upstream_username,
      tenant.upstream_password_ciphertext,
      tenant.upstream_version,
      tenant.plan_id.0,
      tenant.hourly_limit_override.map(|v| v as i64),
      tenant.daily_limit_override.map(|v| v as i64),
      &tenant.allowed_operations,
      &tenant.allowed_models,
      &tenant.allowed_features,
      tenant.status as super::TenantStatus,
      tenant.created_at,
      tenant.updated_at,
      tenant.last_activity,
    )
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn set_status(&self, tenant_id: TenantId, status: super::TenantStatus) -> Result<(), CoreError> {
    sqlx::query!(
      "UPDATE tenants SET status = $1, updated_at = now() WHERE id = $2",
      status as super::TenantStatus,
      tenant_id.0,
    )
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn insert_tenant_user(&self, user: &TenantUser) -> Result<(), CoreError> {
    sqlx::query!(
      r#"
      INSERT INTO tenant_users (tenant_id, email, password_hash, role, upstream_user_id, active)
      VALUES ($1, $2, $3, $4, $5, $6)
      "#,
      user.tenant_id.0,
      user.email,
      user.password_hash,
      user.role as super::TenantUserRole,
      user.upstream_user_id,
      user.active,
    )
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}

// --- sqlx row <-> domain model mapping -------------------------------------

struct TenantRow {
  id: uuid::Uuid,
  slug: String,
  contact_email: String,
  upstream_base_url: String,
  upstream_database: String,
  upstream_username: String,
  upstream_password_ciphertext: String,
  upstream_version: Option<String>,
  plan_id: uuid::Uuid,
  hourly_limit_override: Option<i64>,
  daily_limit_override: Option<i64>,
  allowed_operations: Vec<String>,
  allowed_models: Vec<String>,
  allowed_features: Vec<String>,
  status: super::TenantStatus,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
  last_activity: Option<DateTime<Utc>>,
}

impl From<TenantRow> for Tenant {
  fn from(r: TenantRow) -> Self {
    Tenant {
      id: TenantId(r.id),
      slug: r.slug,
      contact_email: r.contact_email,
      upstream_base_url: r.upstream_base_url,
      upstream_database: r.upstream_database,
      upstream_username: r.upstream_username,
      upstream_password_ciphertext: r.upstream_password_ciphertext,
      upstream_version: r.upstream_version,
      plan_id: PlanId(r.plan_id),
      hourly_limit_override: r.hourly_limit_override.map(|v| v as u64),
      daily_limit_override: r.daily_limit_override.map(|v| v as u64),
      allowed_operations: r.allowed_operations,
      allowed_models: r.allowed_models,
      allowed_features: r.allowed_features,
      status: r.status,
      created_at: r.created_at,
      updated_at: r.updated_at,
      last_activity: r.last_activity,
    }
  }
}

struct PlanRow {
  id: uuid::Uuid,
  name: String,
  daily_quota: i64,
  hourly_quota: i64,
  max_tenant_users: i32,
  feature_flags: Vec<String>,
}

impl From<PlanRow> for Plan {
  fn from(r: PlanRow) -> Self {
    Plan {
      id: PlanId(r.id),
      name: r.name,
      daily_quota: r.daily_quota as u64,
      hourly_quota: r.hourly_quota as u64,
      max_tenant_users: r.max_tenant_users as u32,
      feature_flags: r.feature_flags,
    }
  }
}

#[allow(dead_code)]
struct UserWithTenantRow {
  user_id: i64,
  tenant_id: uuid::Uuid,
  user_email: String,
  password_hash: String,
  role: super::TenantUserRole,
  upstream_user_id: Option<i64>,
  active: bool,
  slug: String,
  contact_email: String,
  upstream_base_url: String,
  upstream_database: String,
  upstream_username: String,
  upstream_password_ciphertext: String,
  upstream_version: Option<String>,
  plan_id: uuid::Uuid,
  hourly_limit_override: Option<i64>,
  daily_limit_override: Option<i64>,
  allowed_operations: Vec<String>,
  allowed_models: Vec<String>,
  allowed_features: Vec<String>,
  status: super::TenantStatus,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
  last_activity: Option<DateTime<Utc>>,
}

impl From<UserWithTenantRow> for (TenantUser, Tenant) {
  fn from(r: UserWithTenantRow) -> Self {
    let user = TenantUser {
      id: bridgecore_core::TenantUserId(r.user_id),
      tenant_id: TenantId(r.tenant_id),
      email: r.user_email,
      password_hash: r.password_hash,
      role: r.role,
      upstream_user_id: r.upstream_user_id,
      active: r.active,
    };
    let tenant = Tenant {
      id: TenantId(r.tenant_id),
      slug: r.slug,
      contact_email: r.contact_email,
      upstream_base_url: r.upstream_base_url,
      upstream_database: r.upstream_database,
      upstream_username: r.upstream_username,
      upstream_password_ciphertext: r.upstream_password_ciphertext,
      upstream_version: r.upstream_version,
      plan_id: PlanId(r.plan_id),
      hourly_limit_override: r.hourly_limit_override.map(|v| v as u64),
      daily_limit_override: r.daily_limit_override.map(|v| v as u64),
      allowed_operations: r.allowed_operations,
      allowed_models: r.allowed_models,
      allowed_features: r.allowed_features,
      status: r.status,
      created_at: r.created_at,
      updated_at: r.updated_at,
      last_activity: r.last_activity,
    };
    (user, tenant)
  }
}

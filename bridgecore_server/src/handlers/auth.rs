use axum::{extract::State, http::header, Extension, Json};
use bridgecore_core::{jwt::TenantRole, CoreError, TokenKind};
use validator::Validate;

use crate::dtos::auth::{AccessTokenResponse, RefreshTokenRequest, TenantLoginRequest, TenantMeResponse, TenantTokenResponse};
use crate::error::AppError;
use crate::services::application::{CallerRole, RequestContext};
use crate::state::AppState;

fn role_tag(role: CallerRole) -> &'static str {
  match role {
    CallerRole::Admin => "admin",
    CallerRole::User => "user",
  }
}

#[utoipa::path(
  post,
  path = "/api/v1/auth/tenant/login",
  request_body = TenantLoginRequest,
  responses((status = 200, body = TenantTokenResponse), (status = 401, description = "Invalid credentials")),
  tag = "auth"
)]
pub async fn login(
  State(state): State<AppState>,
  Json(body): Json<TenantLoginRequest>,
) -> Result<Json<TenantTokenResponse>, AppError> {
  body
    .validate()
    .map_err(|e| CoreError::InvalidPayload(e.to_string()))?;

  let (user, tenant) = state
    .registry
    .resolve_user(&body.email, body.tenant_slug.as_deref(), &body.password)
    .await?;

  let role = match user.role {
    crate::domains::registry::TenantUserRole::Admin => TenantRole::Admin,
    crate::domains::registry::TenantUserRole::User => TenantRole::User,
  };

  let access_token = state.tenant_tokens.issue_tenant_token(
    user.id,
    tenant.id,
    role,
    TokenKind::Access,
    state.config.auth.access_token_ttl_s,
  )?;
  let refresh_token = state.tenant_tokens.issue_tenant_token(
    user.id,
    tenant.id,
    role,
    TokenKind::Refresh,
    state.config.auth.refresh_token_ttl_s,
  )?;

  Ok(Json(TenantTokenResponse {
    access_token,
    refresh_token,
    token_type: "bearer",
    expires_in: state.config.auth.access_token_ttl_s,
  }))
}

#[utoipa::path(
  post,
  path = "/api/v1/auth/tenant/refresh",
  request_body = RefreshTokenRequest,
  responses((status = 200, body = AccessTokenResponse), (status = 401, description = "Invalid or expired refresh token")),
  tag = "auth"
)]
pub async fn refresh(
  State(state): State<AppState>,
  Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<AccessTokenResponse>, AppError> {
  let claims = state
    .tenant_tokens
    .verify_tenant_token(&body.refresh_token, TokenKind::Refresh)?;

  let tenant = state.registry.resolve_by_id(claims.tenant_id).await?;
  if !tenant.status.admits_requests() {
    return Err(CoreError::TenantSuspended.into());
  }

  let access_token = state.tenant_tokens.issue_tenant_token(
    claims.sub,
    claims.tenant_id,
    claims.role,
    TokenKind::Access,
    state.config.auth.access_token_ttl_s,
  )?;

  Ok(Json(AccessTokenResponse {
    access_token,
    token_type: "bearer",
    expires_in: state.config.auth.access_token_ttl_s,
  }))
}

#[utoipa::path(
  post,
  path = "/api/v1/auth/tenant/logout",
  responses((status = 204, description = "Token revoked")),
  security(("access_token" = [])),
  tag = "auth"
)]
pub async fn logout(
  State(state): State<AppState>,
  req: axum::extract::Request,
) -> Result<axum::http::StatusCode, AppError> {
  let Some(token) = req
    .headers()
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
  else {
    return Err(CoreError::MissingToken.into());
  };

  let claims = state.tenant_tokens.verify_tenant_token(token, TokenKind::Access)?;
  let remaining = (claims.exp - chrono::Utc::now().timestamp()).max(0) as u64;
  state.admission.revoke(token, remaining).await?;

  Ok(axum::http::StatusCode::NO_CONTENT)
}

#[utoipa::path(
  post,
  path = "/api/v1/auth/tenant/me",
  responses((status = 200, body = TenantMeResponse)),
  security(("access_token" = [])),
  tag = "auth"
)]
pub async fn me(Extension(context): Extension<RequestContext>) -> Json<TenantMeResponse> {
  Json(TenantMeResponse {
    user_id: context.user_id.0,
    tenant_id: context.tenant.id.0,
    role: role_tag(context.role),
  })
}

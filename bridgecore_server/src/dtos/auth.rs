use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TenantLoginRequest {
  #[validate(email)]
  pub email: String,
  #[validate(length(min = 1))]
  pub password: String,
  /// Scopes the email lookup to one tenant when an address is shared
  /// across tenants; omit when the address is globally unique.
  pub tenant_slug: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TenantTokenResponse {
  pub access_token: String,
  pub refresh_token: String,
  pub token_type: &'static str,
  pub expires_in: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
  pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccessTokenResponse {
  pub access_token: String,
  pub token_type: &'static str,
  pub expires_in: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TenantMeResponse {
  pub user_id: i64,
  pub tenant_id: uuid::Uuid,
  pub role: &'static str,
}

//! Two independent signing spaces: tenant tokens (access + refresh) and
//! admin tokens. Each is verified against its own key so a token minted for
//! one space can never be replayed against the other's endpoints.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{AdminId, TenantId, TenantUserId};

pub const DEFAULT_ACCESS_TOKEN_TTL_S: i64 = 30 * 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_S: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_ADMIN_TOKEN_TTL_S: i64 = 24 * 60 * 60;

const JWT_ISSUER: &str = "bridgecore";
const JWT_LEEWAY_S: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
  Access,
  Refresh,
  Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantRole {
  Admin,
  User,
}

/// Claims carried by tenant-space tokens: `{sub, tenant_id, role, kind,
/// exp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantClaims {
  pub sub: TenantUserId,
  pub tenant_id: TenantId,
  pub role: TenantRole,
  pub kind: TokenKind,
  pub exp: i64,
  pub iat: i64,
}

/// Claims carried by admin-space tokens. A separate signing key keeps this
/// space from ever being confused with the tenant space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
  pub sub: AdminId,
  pub role: String,
  pub kind: TokenKind,
  pub exp: i64,
  pub iat: i64,
}

/// Issues and verifies JWTs for one signing space. `bridgecore_server` holds
/// two instances: one for the tenant key, one for the admin key.
#[derive(Clone)]
pub struct TokenManager {
  encoding_key: EncodingKey,
  decoding_key: DecodingKey,
  validation: Validation,
}

impl TokenManager {
  /// `secret` is the process-wide symmetric key for this signing space,
  /// loaded once at startup.
  pub fn from_secret(secret: &[u8]) -> Self {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = JWT_LEEWAY_S;
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);
    validation.set_issuer(&[JWT_ISSUER]);

    Self {
      encoding_key: EncodingKey::from_secret(secret),
      decoding_key: DecodingKey::from_secret(secret),
      validation,
    }
  }

  pub fn issue_tenant_token(
    &self,
    user_id: TenantUserId,
    tenant_id: TenantId,
    role: TenantRole,
    kind: TokenKind,
    ttl_s: i64,
  ) -> Result<String, CoreError> {
    let now = Utc::now().timestamp();
    let claims = TenantClaimsWithIss {
      sub: user_id,
      tenant_id,
      role,
      kind,
      exp: now + ttl_s,
      iat: now,
      iss: JWT_ISSUER.to_string(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(CoreError::from)
  }

  pub fn verify_tenant_token(&self, token: &str, expect: TokenKind) -> Result<TenantClaims, CoreError> {
    let data = decode::<TenantClaimsWithIss>(token, &self.decoding_key, &self.validation)?;
    if data.claims.kind != expect {
      return Err(CoreError::WrongTokenKind {
        expected: format!("{:?}", expect),
        got: format!("{:?}", data.claims.kind),
      });
    }
    Ok(TenantClaims {
      sub: data.claims.sub,
      tenant_id: data.claims.tenant_id,
      role: data.claims.role,
      kind: data.claims.kind,
      exp: data.claims.exp,
      iat: data.claims.iat,
    })
  }

  pub fn issue_admin_token(&self, admin_id: AdminId, role: &str, ttl_s: i64) -> Result<String, CoreError> {
    let now = Utc::now().timestamp();
    let claims = AdminClaimsWithIss {
      sub: admin_id,
      role: role.to_string(),
      kind: TokenKind::Admin,
      exp: now + ttl_s,
      iat: now,
      iss: JWT_ISSUER.to_string(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(CoreError::from)
  }

  pub fn verify_admin_token(&self, token: &str) -> Result<AdminClaims, CoreError> {
    let data = decode::<AdminClaimsWithIss>(token, &self.decoding_key, &self.validation)?;
    if data.claims.kind != TokenKind::Admin {
      return Err(CoreError::WrongTokenKind {
        expected: "admin".into(),
        got: format!("{:?}", data.claims.kind),
      });
    }
    Ok(AdminClaims {
      sub: data.claims.sub,
      role: data.claims.role,
      kind: data.claims.kind,
      exp: data.claims.exp,
      iat: data.claims.iat,
    })
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct TenantClaimsWithIss {
  sub: TenantUserId,
  tenant_id: TenantId,
  role: TenantRole,
  kind: TokenKind,
  exp: i64,
  iat: i64,
  iss: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AdminClaimsWithIss {
  sub: AdminId,
  role: String,
  kind: TokenKind,
  exp: i64,
  iat: i64,
  iss: String,
}

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  fn manager() -> TokenManager {
    TokenManager::from_secret(b"test-secret-at-least-this-long")
  }

  #[test]
  fn round_trips_access_token() {
    let tm = manager();
    let tenant_id = TenantId(Uuid::new_v4());
    let token = tm
      .issue_tenant_token(
        TenantUserId(1),
        tenant_id,
        TenantRole::User,
        TokenKind::Access,
        DEFAULT_ACCESS_TOKEN_TTL_S,
      )
      .unwrap();
    let claims = tm.verify_tenant_token(&token, TokenKind::Access).unwrap();
    assert_eq!(claims.sub, TenantUserId(1));
    assert_eq!(claims.tenant_id, tenant_id);
  }

  #[test]
  fn refresh_token_rejected_at_access_check() {
    let tm = manager();
    let tenant_id = TenantId(Uuid::new_v4());
    let token = tm
      .issue_tenant_token(
        TenantUserId(1),
        tenant_id,
        TenantRole::User,
        TokenKind::Refresh,
        DEFAULT_REFRESH_TOKEN_TTL_S,
      )
      .unwrap();
    let err = tm.verify_tenant_token(&token, TokenKind::Access).unwrap_err();
    assert!(matches!(err, CoreError::WrongTokenKind { .. }));
  }

  #[test]
  fn admin_token_cannot_be_read_as_tenant_claims() {
    let tm = manager();
    let admin_token = tm
      .issue_admin_token(AdminId(Uuid::new_v4()), "admin", DEFAULT_ADMIN_TOKEN_TTL_S)
      .unwrap();
    // Decodes structurally (both are JSON objects with `sub`/`kind`), but
    // the tenant-space deserializer requires `tenant_id` and `role` as an
    // enum, and admin's `role` is a free string, so this fails to parse.
    let result = tm.verify_tenant_token(&admin_token, TokenKind::Access);
    assert!(result.is_err());
  }
}

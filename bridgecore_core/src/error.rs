use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Severity bucket a [`CoreError`] is filed under when it is persisted as an
/// `ErrorRecord` by the ledger (see `bridgecore_server::services::application::ledger`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

/// The error kinds the request-plane core can produce. These are
/// backend-agnostic; `bridgecore_server::error::AppError` maps each variant
/// onto an HTTP status and response envelope.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
  #[error("missing bearer token")]
  MissingToken,

  #[error("invalid token: {0}")]
  InvalidToken(String),

  #[error("token expired")]
  ExpiredToken,

  #[error("token kind mismatch: expected {expected}, got {got}")]
  WrongTokenKind { expected: String, got: String },

  #[error("tenant not found")]
  TenantUnknown,

  #[error("tenant is suspended")]
  TenantSuspended,

  #[error("tenant is deleted")]
  TenantDeleted,

  #[error("authentication failed")]
  AuthFailed,

  #[error("tenant user is inactive")]
  UserInactive,

  #[error("rate limit exceeded, retry after {retry_after_s}s ({scope})")]
  RateLimited { retry_after_s: u64, scope: String },

  #[error("unknown operation: {0}")]
  UnknownOperation(String),

  #[error("invalid payload: {0}")]
  InvalidPayload(String),

  #[error("model forbidden for tenant: {0}")]
  ModelForbidden(String),

  #[error("upstream authentication failed: {0}")]
  UpstreamAuthFailed(String),

  #[error("upstream call timed out")]
  UpstreamTimeout,

  #[error("upstream unreachable: {0}")]
  UpstreamUnreachable(String),

  #[error("upstream error: {0}")]
  UpstreamError(String),

  #[error("credential vault error: {0}")]
  CryptoError(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("internal error: {0}")]
  Internal(String),
}

impl CoreError {
  /// HTTP status this error kind maps onto.
  pub fn status_code(&self) -> u16 {
    match self {
      CoreError::MissingToken
      | CoreError::InvalidToken(_)
      | CoreError::ExpiredToken
      | CoreError::WrongTokenKind { .. }
      | CoreError::TenantUnknown
      | CoreError::AuthFailed => 401,
      CoreError::TenantSuspended => 403,
      CoreError::TenantDeleted => 410,
      CoreError::UserInactive => 403,
      CoreError::RateLimited { .. } => 429,
      CoreError::UnknownOperation(_)
      | CoreError::InvalidPayload(_)
      | CoreError::ModelForbidden(_) => 400,
      CoreError::UpstreamAuthFailed(_) => 502,
      CoreError::UpstreamTimeout => 504,
      CoreError::UpstreamUnreachable(_) => 502,
      CoreError::UpstreamError(_) => 500,
      CoreError::CryptoError(_) => 500,
      CoreError::NotFound(_) => 404,
      CoreError::Conflict(_) => 409,
      CoreError::Internal(_) => 500,
    }
  }

  /// Machine-readable kind tag carried in the error envelope's `kind` field.
  pub fn kind_tag(&self) -> &'static str {
    match self {
      CoreError::MissingToken => "MissingToken",
      CoreError::InvalidToken(_) => "InvalidToken",
      CoreError::ExpiredToken => "ExpiredToken",
      CoreError::WrongTokenKind { .. } => "WrongTokenKind",
      CoreError::TenantUnknown => "TenantUnknown",
      CoreError::TenantSuspended => "TenantSuspended",
      CoreError::TenantDeleted => "TenantDeleted",
      CoreError::AuthFailed => "AuthFailed",
      CoreError::UserInactive => "UserInactive",
      CoreError::RateLimited { .. } => "RateLimited",
      CoreError::UnknownOperation(_) => "UnknownOperation",
      CoreError::InvalidPayload(_) => "InvalidPayload",
      CoreError::ModelForbidden(_) => "ModelForbidden",
      CoreError::UpstreamAuthFailed(_) => "UpstreamAuthFailed",
      CoreError::UpstreamTimeout => "UpstreamTimeout",
      CoreError::UpstreamUnreachable(_) => "UpstreamUnreachable",
      CoreError::UpstreamError(_) => "UpstreamError",
      CoreError::CryptoError(_) => "CryptoError",
      CoreError::NotFound(_) => "NotFound",
      CoreError::Conflict(_) => "Conflict",
      CoreError::Internal(_) => "InternalError",
    }
  }

  /// Severity used when the gateway files an `ErrorRecord` for this failure.
  /// Rate limiting is back-pressure, not a fault, so it is metric-only and
  /// has no severity.
  pub fn severity(&self) -> Option<Severity> {
    match self.status_code() {
      429 => None,
      400..=499 => Some(Severity::Low),
      500..=599 if matches!(self, CoreError::CryptoError(_) | CoreError::Internal(_)) => {
        Some(Severity::Critical)
      }
      500..=599 => Some(Severity::High),
      _ => Some(Severity::Low),
    }
  }
}

impl From<sqlx::Error> for CoreError {
  fn from(e: sqlx::Error) -> Self {
    CoreError::Internal(format!("database error: {e}"))
  }
}

impl From<jsonwebtoken::errors::Error> for CoreError {
  fn from(e: jsonwebtoken::errors::Error) -> Self {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
      ErrorKind::ExpiredSignature => CoreError::ExpiredToken,
      _ => CoreError::InvalidToken(e.to_string()),
    }
  }
}

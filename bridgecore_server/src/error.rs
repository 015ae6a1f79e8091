use axum::body::Body;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bridgecore_core::CoreError;

/// Error envelope returned to clients: `{ "detail": ..., "kind": ... }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOutput {
  pub detail: String,
  pub kind: String,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
  #[error(transparent)]
  Core(#[from] CoreError),

  #[error("database error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error("cache backend error: {0}")]
  Cache(#[from] redis::RedisError),

  #[error("upstream http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("serialization error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("internal error: {0}")]
  Internal(String),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
}

impl AppError {
  fn core_view(&self) -> CoreError {
    match self {
      AppError::Core(e) => match e {
        CoreError::MissingToken => CoreError::MissingToken,
        CoreError::InvalidToken(m) => CoreError::InvalidToken(m.clone()),
        CoreError::ExpiredToken => CoreError::ExpiredToken,
        CoreError::WrongTokenKind { expected, got } => CoreError::WrongTokenKind {
          expected: expected.clone(),
          got: got.clone(),
        },
        CoreError::TenantUnknown => CoreError::TenantUnknown,
        CoreError::TenantSuspended => CoreError::TenantSuspended,
        CoreError::TenantDeleted => CoreError::TenantDeleted,
        CoreError::AuthFailed => CoreError::AuthFailed,
        CoreError::UserInactive => CoreError::UserInactive,
        CoreError::RateLimited { retry_after_s, scope } => CoreError::RateLimited {
          retry_after_s: *retry_after_s,
          scope: scope.clone(),
        },
        CoreError::UnknownOperation(m) => CoreError::UnknownOperation(m.clone()),
        CoreError::InvalidPayload(m) => CoreError::InvalidPayload(m.clone()),
        CoreError::ModelForbidden(m) => CoreError::ModelForbidden(m.clone()),
        CoreError::UpstreamAuthFailed(m) => CoreError::UpstreamAuthFailed(m.clone()),
        CoreError::UpstreamTimeout => CoreError::UpstreamTimeout,
        CoreError::UpstreamUnreachable(m) => CoreError::UpstreamUnreachable(m.clone()),
        CoreError::UpstreamError(m) => CoreError::UpstreamError(m.clone()),
        CoreError::CryptoError(m) => CoreError::CryptoError(m.clone()),
        CoreError::NotFound(m) => CoreError::NotFound(m.clone()),
        CoreError::Conflict(m) => CoreError::Conflict(m.clone()),
        CoreError::Internal(m) => CoreError::Internal(m.clone()),
      },
      AppError::Sqlx(e) => CoreError::Internal(e.to_string()),
      AppError::Migrate(e) => CoreError::Internal(e.to_string()),
      AppError::Cache(e) => CoreError::Internal(e.to_string()),
      AppError::Http(e) => CoreError::UpstreamUnreachable(e.to_string()),
      AppError::Json(e) => CoreError::InvalidPayload(e.to_string()),
      AppError::Internal(m) => CoreError::Internal(m.clone()),
      AppError::Io(e) => CoreError::Internal(e.to_string()),
    }
  }

  pub fn severity(&self) -> Option<bridgecore_core::error::Severity> {
    self.core_view().severity()
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response<Body> {
    let core = self.core_view();
    let status =
      StatusCode::from_u16(core.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorOutput {
      detail: self.to_string(),
      kind: core.kind_tag().to_string(),
    };

    let mut response = (status, axum::Json(body)).into_response();
    if let CoreError::RateLimited { retry_after_s, .. } = core {
      if let Ok(value) = HeaderValue::from_str(&retry_after_s.to_string()) {
        response.headers_mut().insert("Retry-After", value);
      }
    }
    response
  }
}

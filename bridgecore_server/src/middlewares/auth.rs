//! Runs the admission pipeline against the request's bearer token and
//! attaches the resulting `RequestContext` as a request extension, so
//! handlers downstream extract it instead of re-running admission.

use axum::{
  extract::{Request, State},
  middleware::Next,
  response::Response,
};

use crate::error::AppError;
use crate::state::AppState;

pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
  let bearer = req
    .headers()
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "));

  let context = state.admission.admit(bearer).await?;
  req.extensions_mut().insert(context);

  Ok(next.run(req).await)
}

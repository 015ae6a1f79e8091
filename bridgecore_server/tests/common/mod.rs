//! Shared helpers for the integration tests: spin up an `AppState` against
//! a throwaway database, drive the real router with `tower::ServiceExt`,
//! and decode JSON responses without hand-rolling the plumbing in every
//! test file.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx_db_tester::TestPg;
use tower::ServiceExt;

use bridgecore_server::{get_router, AppState};

pub async fn test_app() -> anyhow::Result<(TestPg, AppState, Router)> {
  let (tdb, state) = AppState::test_new().await?;
  let router = get_router(state.clone());
  Ok((tdb, state, router))
}

pub async fn json_request(router: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
  if let Some(token) = token {
    builder = builder.header("authorization", format!("Bearer {token}"));
  }

  let body = match body {
    Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
    None => Body::empty(),
  };
  let request = builder.body(body).unwrap();

  let response = router.clone().oneshot(request).await.unwrap();
  let status = response.status();
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
  let json = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
  };
  (status, json)
}

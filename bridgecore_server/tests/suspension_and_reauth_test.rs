//! Tenant suspension blocks requests before they reach upstream, and
//! reactivation restores access; a stale upstream session is silently
//! renewed and retried without surfacing the failure to the client.

mod common;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bridgecore_core::TenantId;
use bridgecore_server::domains::registry::{TenantRepository, TenantStatus};
use bridgecore_server::tests::test_utils::{seed_tenant_with_user_and_upstream, GENEROUS_DAILY_QUOTA, GENEROUS_HOURLY_QUOTA};

use common::{json_request, test_app};

async fn login(router: &axum::Router, email: &str, password: &str) -> String {
  let (status, body) = json_request(
    router,
    "POST",
    "/api/v1/auth/tenant/login",
    None,
    Some(json!({ "email": email, "password": password })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK, "login failed: {body}");
  body["access_token"].as_str().unwrap().to_string()
}

async fn set_status(state: &bridgecore_server::AppState, tenant_id: TenantId, status: TenantStatus) {
  state.tenant_repo.set_status(tenant_id, status).await.unwrap();
  state.registry.invalidate(tenant_id);
}

#[tokio::test]
async fn suspended_tenant_is_rejected_before_upstream_and_reactivation_restores_it() {
  let upstream = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/web/session/authenticate"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session_id": "sess-susp" })))
    .mount(&upstream)
    .await;
  Mock::given(method("POST"))
    .and(path("/web/dataset/call_kw"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
    .mount(&upstream)
    .await;

  let (_tdb, state, router) = test_app().await.unwrap();
  let (tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "suspendee@example.test",
    "correct horse battery staple",
    GENEROUS_HOURLY_QUOTA,
    GENEROUS_DAILY_QUOTA,
    &upstream.uri(),
  )
  .await
  .unwrap();

  let token = login(&router, "suspendee@example.test", "correct horse battery staple").await;

  set_status(&state, tenant.id, TenantStatus::Suspended).await;

  let (status, body) = json_request(
    &router,
    "POST",
    "/api/v1/odoo/read",
    Some(&token),
    Some(json!({ "model": "res.partner", "ids": [1] })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::FORBIDDEN, "{body}");
  assert_eq!(body["kind"], json!("TenantSuspended"));

  set_status(&state, tenant.id, TenantStatus::Active).await;

  let (status, body) = json_request(
    &router,
    "POST",
    "/api/v1/odoo/read",
    Some(&token),
    Some(json!({ "model": "res.partner", "ids": [1] })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK, "reactivated tenant should be admitted again: {body}");
}

#[tokio::test]
async fn expired_upstream_session_is_silently_renewed_and_retried() {
  let upstream = MockServer::start().await;

  // Every authenticate call hands out a new session id so the test can
  // tell the first (stale) session apart from the one issued on reauth.
  let auth_calls = std::sync::Arc::new(std::sync::atomic::AtomicI64::new(0));
  {
    let auth_calls = auth_calls.clone();
    Mock::given(method("POST"))
      .and(path("/web/session/authenticate"))
      .respond_with(move |_: &wiremock::Request| {
        let n = auth_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        ResponseTemplate::new(200).set_body_json(json!({ "session_id": format!("sess-{n}") }))
      })
      .mount(&upstream)
      .await;
  }

  // The first call_kw with the first-issued session fails as expired; any
  // other session succeeds. This simulates the upstream invalidating a
  // session out from under the pool.
  Mock::given(method("POST"))
    .and(path("/web/dataset/call_kw"))
    .respond_with(|req: &wiremock::Request| {
      let session = req
        .headers
        .get("x-bridgecore-session")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
      if session == "sess-1" {
        ResponseTemplate::new(401)
      } else {
        ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "still-here" }]))
      }
    })
    .mount(&upstream)
    .await;

  let (_tdb, state, router) = test_app().await.unwrap();
  let (_tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "reauth@example.test",
    "correct horse battery staple",
    GENEROUS_HOURLY_QUOTA,
    GENEROUS_DAILY_QUOTA,
    &upstream.uri(),
  )
  .await
  .unwrap();

  let token = login(&router, "reauth@example.test", "correct horse battery staple").await;

  // The pool has no cached session yet, so this one client call triggers
  // an initial authenticate (`sess-1`), a call_kw that rejects it, a
  // transparent reauth (`sess-2`), and a retry that succeeds.
  let body = json!({ "model": "res.partner", "ids": [1], "fields": ["name"] });
  let (status, resp) = json_request(&router, "POST", "/api/v1/odoo/write", Some(&token), Some(body)).await;

  assert_eq!(status, axum::http::StatusCode::OK, "client must see a single clean 200, not the session error: {resp}");
  assert_eq!(auth_calls.load(std::sync::atomic::Ordering::SeqCst), 2, "pool must authenticate once up front and once more on reauth");
}

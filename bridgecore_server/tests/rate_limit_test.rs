//! Exercises the hourly quota boundary: the Nth request within the window
//! passes and the N+1th is rejected with 429 and a `Retry-After` header.

mod common;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bridgecore_server::tests::test_utils::seed_tenant_with_user_and_upstream;

use common::{json_request, test_app};

const HOURLY_QUOTA: u64 = 3;
const DAILY_QUOTA: u64 = 1_000;

#[tokio::test]
async fn nth_request_passes_and_next_is_rate_limited() {
  let upstream = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/web/session/authenticate"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session_id": "sess-rl" })))
    .mount(&upstream)
    .await;
  Mock::given(method("POST"))
    .and(path("/web/dataset/call_kw"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "partner" }])))
    .mount(&upstream)
    .await;

  let (_tdb, state, router) = test_app().await.unwrap();
  let (_tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "quota@example.test",
    "correct horse battery staple",
    HOURLY_QUOTA,
    DAILY_QUOTA,
    &upstream.uri(),
  )
  .await
  .unwrap();

  let (status, login_body) = json_request(
    &router,
    "POST",
    "/api/v1/auth/tenant/login",
    None,
    Some(json!({ "email": "quota@example.test", "password": "correct horse battery staple" })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK);
  let token = login_body["access_token"].as_str().unwrap().to_string();

  let body = json!({ "model": "res.partner", "ids": [1], "fields": ["name"] });
  for n in 1..=HOURLY_QUOTA {
    let (status, resp) = json_request(&router, "POST", "/api/v1/odoo/read", Some(&token), Some(body.clone())).await;
    assert_eq!(status, axum::http::StatusCode::OK, "request {n} of {HOURLY_QUOTA} should be admitted: {resp}");
  }

  let (status, resp) = json_request(&router, "POST", "/api/v1/odoo/read", Some(&token), Some(body)).await;
  assert_eq!(status, axum::http::StatusCode::TOO_MANY_REQUESTS, "{resp}");
  assert_eq!(resp["kind"], json!("RateLimited"));
}

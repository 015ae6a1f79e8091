//! Login, then read/write against a mocked upstream, exercising the
//! read-through cache's hit/miss/invalidate transitions end to end.

mod common;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bridgecore_server::tests::test_utils::{seed_tenant_with_user_and_upstream, GENEROUS_DAILY_QUOTA, GENEROUS_HOURLY_QUOTA};

use common::{json_request, test_app};

async fn mock_upstream() -> MockServer {
  let server = MockServer::start().await;

  Mock::given(method("POST"))
    .and(path("/web/session/authenticate"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session_id": "sess-token-1" })))
    .mount(&server)
    .await;

  server
}

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

#[tokio::test]
async fn read_is_cached_and_write_invalidates_it() {
  let upstream = mock_upstream().await;

  // `search_read` returns an incrementing counter so the test can tell a
  // cache hit (stale count) from a fresh upstream round-trip.
  let read_count = std::sync::Arc::new(std::sync::atomic::AtomicI64::new(0));
  {
    let read_count = read_count.clone();
    Mock::given(method("POST"))
      .and(path("/web/dataset/call_kw"))
      .respond_with(move |_: &wiremock::Request| {
        let n = read_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": format!("partner-{n}") }]))
      })
      .mount(&upstream)
      .await;
  }

  let (_tdb, state, router) = test_app().await.unwrap();
  let (_tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "reader@example.test",
    "correct horse battery staple",
    GENEROUS_HOURLY_QUOTA,
    GENEROUS_DAILY_QUOTA,
    &upstream.uri(),
  )
  .await
  .unwrap();

  let token = login(&router, "reader@example.test", "correct horse battery staple").await;

  let body = json!({ "model": "res.partner", "ids": [1], "fields": ["name"] });
  let (status, first) = json_request(&router, "POST", "/api/v1/odoo/search_read", Some(&token), Some(body.clone())).await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(first["cached"], json!(false));

  let (status, second) = json_request(&router, "POST", "/api/v1/odoo/search_read", Some(&token), Some(body.clone())).await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(second["cached"], json!(true));
  assert_eq!(first["result"], second["result"], "cached read must return the same payload as the original");
  assert_eq!(read_count.load(std::sync::atomic::Ordering::SeqCst), 1, "second read must not reach upstream");

  let write_body = json!({ "model": "res.partner", "ids": [1], "name": "renamed" });
  let (status, _write) = json_request(&router, "POST", "/api/v1/odoo/write", Some(&token), Some(write_body)).await;
  assert_eq!(status, axum::http::StatusCode::OK);

  let (status, third) = json_request(&router, "POST", "/api/v1/odoo/search_read", Some(&token), Some(body)).await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(third["cached"], json!(false), "write must invalidate the model's cached reads");
  assert_eq!(read_count.load(std::sync::atomic::Ordering::SeqCst), 2, "post-write read must go back to upstream");
}

#[tokio::test]
async fn write_with_empty_ids_is_rejected_before_reaching_upstream() {
  let upstream = mock_upstream().await;
  let (_tdb, state, router) = test_app().await.unwrap();
  let (_tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "validator@example.test",
    "correct horse battery staple",
    GENEROUS_HOURLY_QUOTA,
    GENEROUS_DAILY_QUOTA,
    &upstream.uri(),
  )
  .await
  .unwrap();

  let token = login(&router, "validator@example.test", "correct horse battery staple").await;

  let (status, body) = json_request(
    &router,
    "POST",
    "/api/v1/odoo/write",
    Some(&token),
    Some(json!({ "model": "res.partner", "ids": [] })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn unknown_operation_is_rejected() {
  let upstream = mock_upstream().await;
  let (_tdb, state, router) = test_app().await.unwrap();
  let (_tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "opcheck@example.test",
    "correct horse battery staple",
    GENEROUS_HOURLY_QUOTA,
    GENEROUS_DAILY_QUOTA,
    &upstream.uri(),
  )
  .await
  .unwrap();

  let token = login(&router, "opcheck@example.test", "correct horse battery staple").await;

  let (status, _body) = json_request(
    &router,
    "POST",
    "/api/v1/odoo/drop_table",
    Some(&token),
    Some(json!({ "model": "res.partner" })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

/// A write that fails upstream must not touch the cache for its model: a
/// prior cached read stays servable afterward.
#[tokio::test]
async fn failed_write_does_not_invalidate_the_cache() {
  let upstream = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/web/session/authenticate"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session_id": "sess-failwrite" })))
    .mount(&upstream)
    .await;
  Mock::given(method("POST"))
    .and(path("/web/dataset/call_kw"))
    .respond_with(|req: &wiremock::Request| {
      let body: serde_json::Value = req.body_json().unwrap();
      if body["method"] == "write" {
        ResponseTemplate::new(500)
      } else {
        ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "original" }]))
      }
    })
    .mount(&upstream)
    .await;

  let (_tdb, state, router) = test_app().await.unwrap();
  let (_tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "failwrite@example.test",
    "correct horse battery staple",
    GENEROUS_HOURLY_QUOTA,
    GENEROUS_DAILY_QUOTA,
    &upstream.uri(),
  )
  .await
  .unwrap();

  let token = login(&router, "failwrite@example.test", "correct horse battery staple").await;

  let read_body = json!({ "model": "res.partner", "ids": [1], "fields": ["name"] });
  let (status, first) = json_request(&router, "POST", "/api/v1/odoo/search_read", Some(&token), Some(read_body.clone())).await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(first["cached"], json!(false));

  let (status, _write) = json_request(
    &router,
    "POST",
    "/api/v1/odoo/write",
    Some(&token),
    Some(json!({ "model": "res.partner", "ids": [1], "name": "renamed" })),
  )
  .await;
  assert!(status.is_server_error() || status.is_client_error(), "write to a failing upstream should surface as an error");

  let (status, second) = json_request(&router, "POST", "/api/v1/odoo/search_read", Some(&token), Some(read_body)).await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(second["cached"], json!(true), "a failed write must not have invalidated the prior cached read");
}

/// Two concurrent logins for the same tenant user must each succeed and
/// yield independently valid tokens; neither invalidates the other.
#[tokio::test]
async fn concurrent_logins_are_independent() {
  let upstream = mock_upstream().await;
  let (_tdb, state, router) = test_app().await.unwrap();
  let (_tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "concurrent@example.test",
    "correct horse battery staple",
    GENEROUS_HOURLY_QUOTA,
    GENEROUS_DAILY_QUOTA,
    &upstream.uri(),
  )
  .await
  .unwrap();

  let (first, second) = tokio::join!(
    login(&router, "concurrent@example.test", "correct horse battery staple"),
    login(&router, "concurrent@example.test", "correct horse battery staple"),
  );

  for token in [&first, &second] {
    let (status, me) = json_request(&router, "POST", "/api/v1/auth/tenant/me", Some(token), None).await;
    assert_eq!(status, axum::http::StatusCode::OK, "{me}");
  }
}

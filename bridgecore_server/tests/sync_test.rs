//! First-time and incremental sync pulls, paginated by `limit`, cursor
//! advancement, and reset-then-replay.

mod common;

use serde_json::json;

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

async fn push_event(router: &axum::Router, token: &str, event_id: i64, record_id: i64) {
  let (status, body) = json_request(
    router,
    "POST",
    "/api/v1/webhooks/push",
    Some(token),
    Some(json!({
      "event_id": event_id,
      "model": "res.partner",
      "record_id": record_id,
      "change_kind": "write",
      "payload": { "name": format!("partner-{record_id}") },
    })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK, "push failed: {body}");
}

#[tokio::test]
async fn first_time_then_incremental_pulls_advance_the_cursor() {
  let (_tdb, state, router) = test_app().await.unwrap();
  let (_tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "syncer@example.test",
    "correct horse battery staple",
    GENEROUS_HOURLY_QUOTA,
    GENEROUS_DAILY_QUOTA,
    "https://unused.example.test",
  )
  .await
  .unwrap();

  let token = login(&router, "syncer@example.test", "correct horse battery staple").await;

  for i in 1..=25 {
    push_event(&router, &token, i, i).await;
  }

  let (status, first_page) = json_request(
    &router,
    "POST",
    "/api/v2/sync/pull",
    Some(&token),
    Some(json!({ "device_id": "device-a", "app_type": "manager_app", "limit": 10 })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(first_page["events"].as_array().unwrap().len(), 10);
  assert_eq!(first_page["next_last_id"], json!(10));

  let (status, second_page) = json_request(
    &router,
    "POST",
    "/api/v2/sync/pull",
    Some(&token),
    Some(json!({ "device_id": "device-a", "app_type": "manager_app", "limit": 10 })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(second_page["events"].as_array().unwrap().len(), 10);
  assert_eq!(second_page["next_last_id"], json!(20));

  let (status, third_page) = json_request(
    &router,
    "POST",
    "/api/v2/sync/pull",
    Some(&token),
    Some(json!({ "device_id": "device-a", "app_type": "manager_app", "limit": 10 })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(third_page["events"].as_array().unwrap().len(), 5);
  assert_eq!(third_page["next_last_id"], json!(25));

  for i in 26..=35 {
    push_event(&router, &token, i, i).await;
  }

  let (status, incremental) = json_request(
    &router,
    "POST",
    "/api/v2/sync/pull",
    Some(&token),
    Some(json!({ "device_id": "device-a", "app_type": "manager_app", "limit": 50 })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(incremental["events"].as_array().unwrap().len(), 10, "only the 10 new events since the cursor");
  assert_eq!(incremental["next_last_id"], json!(35));

  let (status, state_resp) = json_request(
    &router,
    "GET",
    "/api/v2/sync/state?device_id=device-a&app_type=manager_app",
    Some(&token),
    None,
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(state_resp["last_seen_event_id"], json!(35));
  assert_eq!(state_resp["cumulative_syncs"], json!(4));
  assert_eq!(state_resp["cumulative_events"], json!(35));
}

#[tokio::test]
async fn reset_replays_from_zero() {
  let (_tdb, state, router) = test_app().await.unwrap();
  let (_tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "resetter@example.test",
    "correct horse battery staple",
    GENEROUS_HOURLY_QUOTA,
    GENEROUS_DAILY_QUOTA,
    "https://unused.example.test",
  )
  .await
  .unwrap();

  let token = login(&router, "resetter@example.test", "correct horse battery staple").await;

  for i in 1..=5 {
    push_event(&router, &token, i, i).await;
  }

  let (status, first_pull) = json_request(
    &router,
    "POST",
    "/api/v2/sync/pull",
    Some(&token),
    Some(json!({ "device_id": "device-b", "app_type": "manager_app", "limit": 50 })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(first_pull["events"].as_array().unwrap().len(), 5);

  let (status, _empty) = json_request(
    &router,
    "POST",
    "/api/v2/sync/pull",
    Some(&token),
    Some(json!({ "device_id": "device-b", "app_type": "manager_app", "limit": 50 })),
  )
  .await;
  assert_eq!(_empty["events"].as_array().unwrap().len(), 0);

  let (status, _reset) = json_request(
    &router,
    "POST",
    "/api/v2/sync/reset",
    Some(&token),
    Some(json!({ "device_id": "device-b", "app_type": "manager_app" })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::NO_CONTENT);

  let (status, replayed) = json_request(
    &router,
    "POST",
    "/api/v2/sync/pull",
    Some(&token),
    Some(json!({ "device_id": "device-b", "app_type": "manager_app", "limit": 50 })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(replayed["events"].as_array().unwrap().len(), 5, "reset must replay every event from zero");
  assert_eq!(replayed["next_last_id"], json!(5));
}

#[tokio::test]
async fn duplicate_event_id_is_deduplicated_on_ingest() {
  let (_tdb, state, router) = test_app().await.unwrap();
  let (_tenant, _user) = seed_tenant_with_user_and_upstream(
    &state,
    "deduper@example.test",
    "correct horse battery staple",
    GENEROUS_HOURLY_QUOTA,
    GENEROUS_DAILY_QUOTA,
    "https://unused.example.test",
  )
  .await
  .unwrap();

  let token = login(&router, "deduper@example.test", "correct horse battery staple").await;

  push_event(&router, &token, 1, 100).await;
  push_event(&router, &token, 1, 100).await;

  let (status, page) = json_request(
    &router,
    "POST",
    "/api/v2/sync/pull",
    Some(&token),
    Some(json!({ "device_id": "device-c", "app_type": "manager_app", "limit": 50 })),
  )
  .await;
  assert_eq!(status, axum::http::StatusCode::OK);
  assert_eq!(page["events"].as_array().unwrap().len(), 1, "duplicate event id must not be ingested twice");
}

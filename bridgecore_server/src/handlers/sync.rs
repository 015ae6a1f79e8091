use axum::{
  extract::{Query, State},
  Extension, Json,
};

use bridgecore_core::CoreError;

use crate::domains::sync::AppType;
use crate::dtos::sync::{SyncCursorDto, SyncEventDto, SyncPullRequest, SyncPullResponse, SyncResetRequest, SyncStateQuery};
use crate::error::AppError;
use crate::services::application::RequestContext;
use crate::state::AppState;

#[utoipa::path(
  post,
  path = "/api/v2/sync/pull",
  request_body = SyncPullRequest,
  responses((status = 200, body = SyncPullResponse)),
  security(("access_token" = [])),
  tag = "sync"
)]
pub async fn pull(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  Json(body): Json<SyncPullRequest>,
) -> Result<Json<SyncPullResponse>, AppError> {
  let upstream_user_id = context.user_id.0;
  let app_type = AppType::parse(&body.app_type);
  let limit = body
    .limit
    .unwrap_or(state.config.sync.default_limit)
    .min(state.config.sync.max_limit);

  if body.device_id.trim().is_empty() {
    return Err(CoreError::InvalidPayload("`device_id` must not be empty".to_string()).into());
  }

  let result = state
    .sync_engine
    .pull(
      context.tenant.id,
      upstream_user_id,
      &body.device_id,
      app_type,
      limit,
      body.model_filter.as_deref(),
    )
    .await?;

  Ok(Json(SyncPullResponse {
    events: result
      .events
      .into_iter()
      .map(|e| SyncEventDto {
        id: e.id.0,
        model: e.model,
        record_id: e.record_id,
        change_kind: format!("{:?}", e.change_kind).to_lowercase(),
        payload: e.payload.map(serde_json::Value::from),
        priority: e.priority,
        server_timestamp: e.server_timestamp,
      })
      .collect(),
    next_last_id: result.next_last_id.0,
    cursor: SyncCursorDto {
      last_seen_event_id: result.cursor.last_seen_event_id.0,
      last_sync_at: result.cursor.last_sync_at,
      cumulative_syncs: result.cursor.cumulative_syncs,
      cumulative_events: result.cursor.cumulative_events,
    },
  }))
}

#[utoipa::path(
  get,
  path = "/api/v2/sync/state",
  params(SyncStateQuery),
  responses((status = 200, body = SyncCursorDto)),
  security(("access_token" = [])),
  tag = "sync"
)]
pub async fn state_(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  Query(query): Query<SyncStateQuery>,
) -> Result<Json<SyncCursorDto>, AppError> {
  let upstream_user_id = context.user_id.0;
  let app_type = AppType::parse(&query.app_type);

  let cursor = state
    .sync_engine
    .state(context.tenant.id, upstream_user_id, &query.device_id, app_type)
    .await?;

  Ok(Json(SyncCursorDto {
    last_seen_event_id: cursor.last_seen_event_id.0,
    last_sync_at: cursor.last_sync_at,
    cumulative_syncs: cursor.cumulative_syncs,
    cumulative_events: cursor.cumulative_events,
  }))
}

#[utoipa::path(
  post,
  path = "/api/v2/sync/reset",
  request_body = SyncResetRequest,
  responses((status = 204, description = "Cursor reset to zero")),
  security(("access_token" = [])),
  tag = "sync"
)]
pub async fn reset(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  Json(body): Json<SyncResetRequest>,
) -> Result<axum::http::StatusCode, AppError> {
  let upstream_user_id = context.user_id.0;
  let app_type = AppType::parse(&body.app_type);

  state
    .sync_engine
    .reset(context.tenant.id, upstream_user_id, &body.device_id, app_type)
    .await?;

  Ok(axum::http::StatusCode::NO_CONTENT)
}

use axum::{extract::State, Extension, Json};
use chrono::Utc;

use bridgecore_core::{CoreError, EventId, Value};

use crate::domains::events::{ChangeKind, Event};
use crate::dtos::webhooks::{CheckUpdatesResponse, WebhookPushRequest, WebhookPushResponse};
use crate::error::AppError;
use crate::services::application::RequestContext;
use crate::state::AppState;

fn parse_change_kind(raw: &str) -> Result<ChangeKind, AppError> {
  match raw {
    "create" => Ok(ChangeKind::Create),
    "write" => Ok(ChangeKind::Write),
    "unlink" => Ok(ChangeKind::Unlink),
    other => Err(CoreError::InvalidPayload(format!("unknown change_kind `{other}`")).into()),
  }
}

#[utoipa::path(
  post,
  path = "/api/v1/webhooks/push",
  request_body = WebhookPushRequest,
  responses((status = 200, body = WebhookPushResponse)),
  security(("access_token" = [])),
  tag = "webhooks"
)]
pub async fn push(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  Json(body): Json<WebhookPushRequest>,
) -> Result<Json<WebhookPushResponse>, AppError> {
  let event = Event {
    id: EventId(body.event_id),
    tenant_id: context.tenant.id,
    model: body.model,
    record_id: body.record_id,
    change_kind: parse_change_kind(&body.change_kind)?,
    server_timestamp: body.server_timestamp.unwrap_or_else(Utc::now),
    payload: body.payload.map(Value::from),
    priority: body.priority,
  };

  let event_id = event.id.0;
  state.event_ingestor.push(context.tenant.id, event).await?;

  Ok(Json(WebhookPushResponse {
    accepted: true,
    event_id,
  }))
}

#[utoipa::path(
  get,
  path = "/api/v1/webhooks/check-updates",
  responses((status = 200, body = CheckUpdatesResponse)),
  security(("access_token" = [])),
  tag = "webhooks"
)]
pub async fn check_updates(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
) -> Result<Json<CheckUpdatesResponse>, AppError> {
  let upstream = state.admission.upstream_config(&context.tenant)?;
  let pulled = state.event_ingestor.pull(context.tenant.id, &upstream).await?;

  Ok(Json(CheckUpdatesResponse {
    has_updates: pulled > 0,
    new_events_pulled: pulled,
  }))
}

use axum::{
  extract::{Path, State},
  Extension, Json,
};
use bridgecore_core::Value;

use crate::dtos::rpc::{RpcCallRequest, RpcCallResponse};
use crate::error::AppError;
use crate::services::application::RequestContext;
use crate::state::AppState;

#[utoipa::path(
  post,
  path = "/api/v1/odoo/{operation}",
  request_body = RpcCallRequest,
  responses((status = 200, body = RpcCallResponse), (status = 403, description = "Operation or model not permitted")),
  params(("operation" = String, Path, description = "One of the enumerated RPC operations")),
  security(("access_token" = [])),
  tag = "odoo"
)]
pub async fn dispatch(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  Path(operation): Path<String>,
  Json(body): Json<RpcCallRequest>,
) -> Result<Json<RpcCallResponse>, AppError> {
  let upstream = state.admission.upstream_config(&context.tenant)?;
  let payload = Value::from(body.0);

  let response = state
    .gateway
    .dispatch(&context.tenant, &upstream, &operation, payload)
    .await?;

  Ok(Json(RpcCallResponse {
    result: serde_json::Value::from(response.result),
    cached: response.cached,
    tenant_id: response.tenant_id.0,
  }))
}

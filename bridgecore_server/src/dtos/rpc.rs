use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Body of a gateway call: an arbitrary Odoo-style JSON-RPC payload,
/// e.g. `{"model": "sale.order", "ids": [12], "fields": ["name"]}`. Kept
/// as a raw JSON object at the wire boundary; the gateway canonicalizes it
/// into `bridgecore_core::Value` before it touches cache keys or upstream.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RpcCallRequest(#[schema(value_type = Object)] pub serde_json::Value);

#[derive(Debug, Serialize, ToSchema)]
pub struct RpcCallResponse {
  #[schema(value_type = Object)]
  pub result: serde_json::Value,
  pub cached: bool,
  pub tenant_id: Uuid,
}

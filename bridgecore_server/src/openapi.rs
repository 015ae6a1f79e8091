//! Aggregates every handler's `#[utoipa::path]` annotation into one
//! OpenAPI document, served as JSON and rendered by Swagger UI.

use utoipa::{
  openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
  Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::dtos::auth::{AccessTokenResponse, RefreshTokenRequest, TenantLoginRequest, TenantMeResponse, TenantTokenResponse};
use crate::dtos::rpc::{RpcCallRequest, RpcCallResponse};
use crate::dtos::sync::{SyncCursorDto, SyncEventDto, SyncPullRequest, SyncPullResponse, SyncResetRequest, SyncStateQuery};
use crate::dtos::webhooks::{CheckUpdatesResponse, WebhookPushRequest, WebhookPushResponse};
use crate::error::ErrorOutput;
use crate::handlers;

#[derive(OpenApi)]
#[openapi(
  paths(
    handlers::health::liveness,
    handlers::health::database_health,
    handlers::health::cache_health,
    handlers::health::full_health,
    handlers::auth::login,
    handlers::auth::refresh,
    handlers::auth::logout,
    handlers::auth::me,
    handlers::rpc::dispatch,
    handlers::webhooks::push,
    handlers::webhooks::check_updates,
    handlers::sync::pull,
    handlers::sync::state_,
    handlers::sync::reset,
  ),
  components(schemas(
    ErrorOutput,
    TenantLoginRequest,
    TenantTokenResponse,
    RefreshTokenRequest,
    AccessTokenResponse,
    TenantMeResponse,
    RpcCallRequest,
    RpcCallResponse,
    WebhookPushRequest,
    WebhookPushResponse,
    CheckUpdatesResponse,
    SyncPullRequest,
    SyncPullResponse,
    SyncEventDto,
    SyncCursorDto,
    SyncResetRequest,
  )),
  modifiers(&SecurityAddon),
  tags(
    (name = "health", description = "Liveness and dependency health checks"),
    (name = "auth", description = "Tenant-user authentication"),
    (name = "odoo", description = "Odoo-style RPC gateway"),
    (name = "webhooks", description = "Upstream change event ingestion"),
    (name = "sync", description = "Incremental mobile/offline sync"),
  )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
  fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
    if let Some(components) = openapi.components.as_mut() {
      components.add_security_scheme(
        "access_token",
        SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
      );
    }
  }
}

pub fn swagger_router() -> SwaggerUi {
  SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi())
}

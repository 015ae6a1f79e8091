pub mod config;
pub mod domains;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middlewares;
pub mod migrations;
pub mod openapi;
pub mod services;
pub mod state;
#[cfg(any(test, feature = "test-util"))]
pub mod tests;

pub use config::AppConfig;
pub use error::{AppError, ErrorOutput};
pub use state::AppState;

use axum::{
  middleware,
  routing::{get, post},
  Router,
};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use middlewares::{auth_middleware, request_id_middleware};

pub fn get_router(state: AppState) -> Router {
  let request_timeout = std::time::Duration::from_millis(state.config.server.request_timeout_ms);

  let public_routes = Router::new()
    .route("/health", get(handlers::health::liveness))
    .route("/health/db", get(handlers::health::database_health))
    .route("/health/cache", get(handlers::health::cache_health))
    .route("/health/full", get(handlers::health::full_health))
    .route("/api/v1/auth/tenant/login", post(handlers::auth::login))
    .route("/api/v1/auth/tenant/refresh", post(handlers::auth::refresh));

  let protected_routes = Router::new()
    .route("/api/v1/auth/tenant/logout", post(handlers::auth::logout))
    .route("/api/v1/auth/tenant/me", post(handlers::auth::me))
    .route("/api/v1/odoo/{operation}", post(handlers::rpc::dispatch))
    .route("/api/v1/webhooks/push", post(handlers::webhooks::push))
    .route("/api/v1/webhooks/check-updates", get(handlers::webhooks::check_updates))
    .route("/api/v2/sync/pull", post(handlers::sync::pull))
    .route("/api/v2/sync/state", get(handlers::sync::state_))
    .route("/api/v2/sync/reset", post(handlers::sync::reset))
    .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

  Router::new()
    .merge(public_routes)
    .merge(protected_routes)
    .merge(openapi::swagger_router())
    .layer(middleware::from_fn(request_id_middleware))
    .layer(TraceLayer::new_for_http())
    .layer(TimeoutLayer::new(request_timeout))
    .layer(CorsLayer::permissive())
    .with_state(state)
}

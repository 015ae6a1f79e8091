//! BridgeCore server entry point: loads configuration, wires the shared
//! application state, and serves the HTTP surface.

use bridgecore_server::{config::AppConfig, get_router, AppError, AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), AppError> {
  let config = AppConfig::load(".").expect("failed to load configuration");

  let _tracing_guard = bridgecore_server::services::infrastructure::observability::init_tracing(&config.observability)?;
  let _metrics_guard = bridgecore_server::services::infrastructure::observability::init_metrics(&config.observability)
    .await?;

  let state = AppState::try_new(config.clone()).await?;
  let app = get_router(state);

  let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
  info!(%addr, "bridgecore server listening");

  let listener = TcpListener::bind(addr).await?;
  axum::serve(listener, app).await?;

  Ok(())
}

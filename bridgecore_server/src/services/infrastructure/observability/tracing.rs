use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::error::AppError;

pub struct TracingGuard;

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default
/// filter; `observability.log_json` switches the formatter for log
/// aggregators that expect structured lines.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<TracingGuard, AppError> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let registry = tracing_subscriber::registry().with(filter);

  if config.log_json {
    registry
      .with(fmt::layer().json().with_target(true).with_current_span(true))
      .try_init()
  } else {
    registry
      .with(fmt::layer().with_target(true).with_line_number(true))
      .try_init()
  }
  .map_err(|e| AppError::Internal(format!("failed to init tracing subscriber: {e}")))?;

  Ok(TracingGuard)
}

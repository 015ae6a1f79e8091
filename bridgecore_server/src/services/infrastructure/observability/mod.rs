pub mod metrics;
pub mod tracing;

pub use metrics::{init_metrics, MetricsGuard};
pub use tracing::{init_tracing, TracingGuard};

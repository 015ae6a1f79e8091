pub mod admission;
pub mod event_ingestor;
pub mod gateway;
pub mod ledger;
pub mod rate_limiter;
pub mod read_cache;
pub mod scheduler;
pub mod session_pool;
pub mod sync_engine;

pub use admission::{AdmissionPipeline, CallerRole, RequestContext};
pub use event_ingestor::EventIngestor;
pub use gateway::{RpcGateway, RpcResponse};
pub use ledger::{Ledger, UsageEvent};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use read_cache::ReadThroughCache;
pub use scheduler::Scheduler;
pub use session_pool::UpstreamSessionPool;
pub use sync_engine::{SyncEngine, SyncPullResult};

pub mod kv;
pub mod observability;

pub use kv::KvStore;

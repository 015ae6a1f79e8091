pub mod auth;
pub mod request_id;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub use auth::auth_middleware;
pub use request_id::request_id_middleware;

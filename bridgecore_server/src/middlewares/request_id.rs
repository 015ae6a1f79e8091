//! Generates a request id for every inbound request, or reuses one the
//! caller already supplied, and echoes it back on the response so a
//! single request can be traced across client, gateway, and upstream logs.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::warn;
use uuid::Uuid;

use super::REQUEST_ID_HEADER;

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
  let id = match req.headers().get(REQUEST_ID_HEADER) {
    Some(v) => Some(v.to_owned()),
    None => {
      let generated = Uuid::new_v4().to_string();
      match HeaderValue::from_str(&generated) {
        Ok(v) => {
          req.headers_mut().insert(REQUEST_ID_HEADER, v.clone());
          Some(v)
        }
        Err(e) => {
          warn!(error = %e, "failed to build request id header");
          None
        }
      }
    }
  };

  let mut res = next.run(req).await;
  if let Some(id) = id {
    res.headers_mut().insert(REQUEST_ID_HEADER, id);
  }
  res
}

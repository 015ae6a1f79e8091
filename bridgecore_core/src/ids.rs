//! Newtype wrappers for the identifiers that flow through the request plane.
//!
//! These prevent mixing up, say, a `TenantId` and an `AdminId` at a call site
//! that only checks types at compile time.

use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Opaque tenant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

/// Plan identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

/// A `TenantUser` identifier, unique within its tenant.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type, ToSchema,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct TenantUserId(pub i64);

/// Admin identity, a separate space from tenant users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct AdminId(pub Uuid);

/// Monotonic event id, scoped to a single tenant's upstream. Its ordering
/// is the authority the sync engine relies on for cursor advancement.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type, ToSchema,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct EventId(pub i64);

/// Client-supplied device identifier, part of a sync cursor key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl fmt::Display for TenantId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for PlanId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for TenantUserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for AdminId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for DeviceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<i64> for TenantUserId {
  fn from(id: i64) -> Self {
    TenantUserId(id)
  }
}

impl From<i64> for EventId {
  fn from(id: i64) -> Self {
    EventId(id)
  }
}

impl From<&str> for DeviceId {
  fn from(id: &str) -> Self {
    DeviceId(id.to_string())
  }
}

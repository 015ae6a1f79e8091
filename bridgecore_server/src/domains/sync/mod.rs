//! Per-(tenant, upstream-user, device, app-type) sync cursors.

pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bridgecore_core::{EventId, TenantId};

pub use repository::{PgSyncRepository, SyncRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppType {
  SalesApp,
  DeliveryApp,
  WarehouseApp,
  ManagerApp,
  MobileApp,
}

impl AppType {
  pub fn parse(raw: &str) -> AppType {
    match raw {
      "sales_app" => AppType::SalesApp,
      "delivery_app" => AppType::DeliveryApp,
      "warehouse_app" => AppType::WarehouseApp,
      "manager_app" => AppType::ManagerApp,
      _ => AppType::MobileApp,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      AppType::SalesApp => "sales_app",
      AppType::DeliveryApp => "delivery_app",
      AppType::WarehouseApp => "warehouse_app",
      AppType::ManagerApp => "manager_app",
      AppType::MobileApp => "mobile_app",
    }
  }

  /// Static mapping from app-type to the models that app cares about; an
  /// empty set means "all models".
  pub fn model_profile(self) -> &'static [&'static str] {
    match self {
      AppType::SalesApp => &["sale.order", "res.partner", "product.product"],
      AppType::DeliveryApp => &["stock.picking", "res.partner"],
      AppType::WarehouseApp => &["stock.picking", "product.product"],
      AppType::ManagerApp | AppType::MobileApp => &[],
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
  pub id: i64,
  pub tenant_id: TenantId,
  pub upstream_user_id: i64,
  pub device_id: String,
  pub app_type: AppType,
  pub last_seen_event_id: EventId,
  pub last_sync_at: Option<DateTime<Utc>>,
  pub cumulative_syncs: i64,
  pub cumulative_events: i64,
  pub active: bool,
}

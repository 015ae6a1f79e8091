pub mod error;
pub mod ids;
pub mod jwt;
pub mod value;
pub mod vault;

pub use error::CoreError;
pub use ids::{AdminId, DeviceId, EventId, PlanId, TenantId, TenantUserId};
pub use jwt::{AdminClaims, TenantClaims, TokenKind, TokenManager};
pub use value::{cache_key, Value};
pub use vault::{AesGcmVault, CredentialVault, VaultKey, VaultKeySet};

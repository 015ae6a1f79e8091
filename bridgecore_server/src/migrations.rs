//! Applies the versioned SQL files under the workspace `migrations/`
//! directory at startup, tracked in the standard `_sqlx_migrations` table,
//! so a fresh deployment never depends on an operator running `sqlx
//! migrate` by hand first.

use sqlx::PgPool;
use tracing::info;

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
  info!("applying database migrations");
  sqlx::migrate!("../migrations").run(pool).await?;
  info!("migrations up to date");
  Ok(())
}

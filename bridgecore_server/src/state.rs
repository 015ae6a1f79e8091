//! Wires every domain repository and application service into one shared,
//! cheaply-cloned handle injected through axum's `State` extractor.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use bridgecore_core::{AesGcmVault, CredentialVault, TokenManager, VaultKey, VaultKeySet};

use crate::config::AppConfig;
use crate::domains::events::{EventRepository, PgEventRepository};
use crate::domains::registry::{PgTenantRepository, TenantRegistry, TenantRepository};
use crate::domains::sync::{PgSyncRepository, SyncRepository};
use crate::domains::usage::{PgUsageRepository, UsageRepository};
use crate::error::AppError;
use crate::services::application::{
  AdmissionPipeline, EventIngestor, Ledger, RateLimiter, ReadThroughCache, RpcGateway, Scheduler, SyncEngine,
  UpstreamSessionPool,
};
use crate::services::infrastructure::KvStore;

const LEDGER_WRITER_COUNT: usize = 4;

#[derive(Clone)]
pub struct AppState {
  inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
  pub config: AppConfig,
  pub pool: sqlx::PgPool,
  pub kv: KvStore,
  pub vault: Arc<dyn CredentialVault>,
  pub tenant_repo: Arc<dyn TenantRepository>,
  pub tenant_tokens: TokenManager,
  pub admin_tokens: TokenManager,
  pub registry: Arc<TenantRegistry>,
  pub rate_limiter: Arc<RateLimiter>,
  pub admission: Arc<AdmissionPipeline>,
  pub cache: Arc<ReadThroughCache>,
  pub session_pool: Arc<UpstreamSessionPool>,
  pub gateway: Arc<RpcGateway>,
  pub ledger: Arc<Ledger>,
  pub event_ingestor: Arc<EventIngestor>,
  pub sync_engine: Arc<SyncEngine>,
  pub scheduler: Arc<Scheduler>,
}

impl Deref for AppState {
  type Target = AppStateInner;

  fn deref(&self) -> &Self::Target {
    &self.inner
  }
}

impl AppState {
  pub async fn try_new(config: AppConfig) -> Result<Self, AppError> {
    let pool = PgPoolOptions::new()
      .max_connections(20)
      .connect(&config.server.db_url)
      .await?;
    crate::migrations::run_migrations(&pool).await?;

    Self::try_new_with_pool(config, pool).await
  }

  /// Wires every service against an already-connected, already-migrated
  /// pool. Factored out of `try_new` so test harnesses can hand in a
  /// pool backed by a throwaway database without duplicating the wiring.
  pub async fn try_new_with_pool(config: AppConfig, pool: sqlx::PgPool) -> Result<Self, AppError> {
    let kv = KvStore::connect(&config.server.kv_url, "bridgecore").await?;

    let vault_keys = VaultKeySet::new(vec![VaultKey::from_passphrase(1, &config.credential.key)]);
    let vault: Arc<dyn CredentialVault> = Arc::new(AesGcmVault::new(vault_keys));

    let tenant_repo: Arc<dyn TenantRepository> = Arc::new(PgTenantRepository::new(pool.clone()));
    let event_repo: Arc<dyn EventRepository> = Arc::new(PgEventRepository::new(pool.clone()));
    let sync_repo: Arc<dyn SyncRepository> = Arc::new(PgSyncRepository::new(pool.clone()));
    let usage_repo: Arc<dyn UsageRepository> = Arc::new(PgUsageRepository::new(pool.clone()));

    let tenant_tokens = TokenManager::from_secret(config.auth.tenant_signing_secret.as_bytes());
    let admin_tokens = TokenManager::from_secret(config.auth.admin_signing_secret.as_bytes());

    let registry = Arc::new(TenantRegistry::new(tenant_repo.clone(), vault.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(kv.clone()));
    let admission = Arc::new(AdmissionPipeline::new(
      registry.clone(),
      rate_limiter.clone(),
      tenant_tokens.clone(),
      kv.clone(),
    ));

    let cache = Arc::new(ReadThroughCache::new(kv.clone(), config.cache.default_ttl_s));
    let session_pool = Arc::new(UpstreamSessionPool::new(
      Duration::from_secs(config.upstream.default_timeout_s),
      Duration::from_secs(config.session.idle_ttl_s),
    )?);
    let ledger = Arc::new(Ledger::spawn(usage_repo.clone(), config.usage.queue_depth, LEDGER_WRITER_COUNT));
    let gateway = Arc::new(RpcGateway::new(session_pool.clone(), cache.clone(), ledger.clone()));

    let event_ingestor = Arc::new(EventIngestor::new(event_repo.clone(), session_pool.clone()));
    let sync_engine = Arc::new(SyncEngine::new(event_repo.clone(), sync_repo.clone()));

    let scheduler = Arc::new(Scheduler::new(
      tenant_repo.clone(),
      usage_repo.clone(),
      event_repo.clone(),
      sync_repo.clone(),
      session_pool.clone(),
      kv.clone(),
      config.usage.retention_days,
    ));
    scheduler.clone().spawn();

    Ok(Self {
      inner: Arc::new(AppStateInner {
        config,
        pool,
        kv,
        vault,
        tenant_repo,
        tenant_tokens,
        admin_tokens,
        registry,
        rate_limiter,
        admission,
        cache,
        session_pool,
        gateway,
        ledger,
        event_ingestor,
        sync_engine,
        scheduler,
      }),
    })
  }
}

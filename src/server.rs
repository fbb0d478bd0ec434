//!
//! babytrack HTTP server
//! ---------------------
//! Builds the shared state (document store, credential cache, token issuer and
//! the services on top), mounts the routes under `/api/v1`, runs the periodic
//! sweeper and serves until a shutdown signal arrives.

pub mod cookies;
pub mod extract;
mod auth_routes;
mod care_routes;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::care::CareService;
use crate::clock::{SharedClock, SystemClock};
use crate::config::Config;
use crate::error::AppError;
use crate::identity::{AccountService, ActivationWorkflow, SessionManager, TokenIssuer, TokenSigner};
use crate::mail::SharedMailer;
use crate::storage::{DocumentStore, KvStore, SharedCache};

/// Shared server state injected into all handlers.
///
/// Every backend is built once in `build` (or handed to `assemble` by tests)
/// and reached through the services; handlers never touch storage directly.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub clock: SharedClock,
    pub issuer: Arc<TokenIssuer>,
    pub accounts: Arc<AccountService>,
    pub activation: Arc<ActivationWorkflow>,
    pub care: Arc<CareService>,
    pub documents: Arc<DocumentStore>,
    /// Set when the credential cache is in-process; swept and snapshotted here.
    pub memory_cache: Option<KvStore>,
}

impl AppState {
    /// Open the data directory and the configured credential cache.
    pub async fn build(config: Config, clock: SharedClock, mailer: SharedMailer) -> anyhow::Result<Self> {
        let documents = DocumentStore::open(&config.data_dir)
            .with_context(|| format!("While opening document store under {:?}", config.data_dir))?
            .shared();
        let (cache, memory_cache) = match remote_cache(&config).await? {
            Some(cache) => (cache, None),
            None => {
                let kv = local_cache(&config, clock.clone());
                (Arc::new(kv.clone()) as SharedCache, Some(kv))
            }
        };
        Ok(Self::assemble(config, clock, mailer, documents, cache, memory_cache))
    }

    /// Wire the services over backends that already exist.
    pub fn assemble(
        config: Config,
        clock: SharedClock,
        mailer: SharedMailer,
        documents: Arc<DocumentStore>,
        cache: SharedCache,
        memory_cache: Option<KvStore>,
    ) -> Self {
        let signer = Arc::new(TokenSigner::new(&config.secrets, config.access_ttl_secs, config.refresh_ttl_secs, clock.clone()));
        let sessions = SessionManager::new(cache, config.refresh_ttl_secs, clock.clone());
        let issuer = Arc::new(TokenIssuer::new(signer.clone(), sessions));
        let accounts = Arc::new(AccountService::new(documents.clone(), documents.clone(), issuer.clone(), clock.clone()));
        let activation = Arc::new(ActivationWorkflow::new(
            documents.clone(),
            documents.clone(),
            signer,
            mailer,
            clock.clone(),
            config.activation_ttl_secs,
            config.resend_cooldown_secs,
        ));
        let care = Arc::new(CareService::new(documents.clone(), clock.clone()));
        Self { config: Arc::new(config), clock, issuer, accounts, activation, care, documents, memory_cache }
    }

    /// One sweep pass: expired cache entries and expired pending activations.
    pub async fn sweep_once(&self) -> usize {
        let mut removed = 0;
        if let Some(kv) = self.memory_cache.as_ref() {
            removed += kv.sweep();
        }
        match self.activation.sweep().await {
            Ok(n) => removed += n,
            Err(e) => warn!(target: "sweep", "activation sweep failed: {}", e),
        }
        removed
    }

    /// Write the in-process cache snapshot, when one is configured.
    pub fn persist_cache(&self) {
        let Some(kv) = self.memory_cache.as_ref() else { return };
        if kv.snapshot_path().is_none() { return; }
        match kv.save_snapshot() {
            Ok(n) => info!(target: "startup", "saved {} cache entr(ies) to {:?}", n, kv.snapshot_path()),
            Err(e) => warn!(target: "startup", "cache snapshot failed: {}", e),
        }
    }
}

#[cfg(feature = "redis")]
async fn remote_cache(config: &Config) -> anyhow::Result<Option<SharedCache>> {
    let Some(url) = config.redis_url.as_deref() else { return Ok(None) };
    let cache = crate::storage::RedisCache::connect(url)
        .await
        .context("While connecting to the Redis credential cache")?;
    info!(target: "startup", "credential cache: redis");
    Ok(Some(Arc::new(cache)))
}

#[cfg(not(feature = "redis"))]
async fn remote_cache(config: &Config) -> anyhow::Result<Option<SharedCache>> {
    if config.redis_url.is_some() {
        warn!(target: "startup", "REDIS_URL is set but this build lacks the `redis` feature; using the in-process cache");
    }
    Ok(None)
}

fn local_cache(config: &Config, clock: SharedClock) -> KvStore {
    if !config.cache_snapshot {
        return KvStore::new(clock);
    }
    let kv = KvStore::with_snapshot(clock, config.data_dir.join("cache.bin"));
    match kv.load_snapshot() {
        Ok(n) => info!(target: "startup", "restored {} cache entr(ies) from {:?}", n, kv.snapshot_path()),
        Err(e) => warn!(target: "startup", "ignoring unreadable cache snapshot: {}", e),
    }
    kv
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .merge(auth_routes::routes())
        .merge(care_routes::routes());
    Router::new()
        .nest("/api/v1", api)
        .fallback(not_found)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "success": true, "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn not_found() -> AppError {
    AppError::not_found("route_not_found", "Route not found")
}

/// Background sweeper on `sweep_interval_secs`.
pub fn spawn_sweeper(state: AppState) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = state.sweep_once().await;
            if removed > 0 { debug!(target: "sweep", removed = removed, "sweep"); }
        }
    })
}

/// Serve on `listener` until `shutdown` resolves, then stop the sweeper and
/// persist the cache snapshot.
pub async fn serve<F>(listener: tokio::net::TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let sweeper = spawn_sweeper(state.clone());
    let app = router(state.clone());
    let result = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;
    sweeper.abort();
    state.persist_cache();
    result.context("HTTP server failed")
}

pub async fn run(config: Config, mailer: SharedMailer) -> anyhow::Result<()> {
    config.log_summary();
    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let clock: SharedClock = Arc::new(SystemClock);
    let state = AppState::build(config, clock, mailer).await?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("While binding {}", addr))?;
    info!(target: "startup", "Starting server on {}", addr);
    serve(listener, state, shutdown_signal()).await?;
    info!(target: "startup", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(target: "startup", "ctrl-c handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                warn!(target: "startup", "SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target: "startup", "shutdown signal received");
}

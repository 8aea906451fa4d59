use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mural::app::engine::{EngineDeps, MuralEngine, MuralSettings};
use mural::app::identity::IdentityStore;
use mural::app::preview::LinkPreviewResolver;
use mural::config::{AppConfig, StoreBackend};
use mural::infra::cache::RedisCache;
use mural::infra::clock::{Clock, SystemClock};
use mural::infra::db::Db;
use mural::infra::fetch::HttpPageFetcher;
use mural::infra::geo::{DisabledGeocoder, Geocoder, HttpGeocoder};
use mural::infra::memory_store::{MemoryPostStore, MemoryReportStore};
use mural::infra::pg_store::{PgPostStore, PgReportStore};
use mural::infra::prefs::PrefsFile;
use mural::infra::store::{PostStore, ReportStore};
use mural::{http, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (store, reports, db): (Arc<dyn PostStore>, Arc<dyn ReportStore>, Option<Db>) =
        match config.store_backend {
            StoreBackend::Postgres => {
                let db = Db::connect(&config).await?;
                db.migrate().await?;
                (
                    Arc::new(PgPostStore::new(db.clone())),
                    Arc::new(PgReportStore::new(db.clone())),
                    Some(db),
                )
            }
            StoreBackend::Memory => {
                tracing::warn!("using the in-memory store, posts are lost on exit");
                (
                    Arc::new(MemoryPostStore::with_clock(clock.clone())),
                    Arc::new(MemoryReportStore::with_clock(clock.clone())),
                    None,
                )
            }
        };

    let cache = match &config.redis_url {
        Some(url) => Some(RedisCache::connect(url).await?),
        None => None,
    };

    let timeout = Duration::from_millis(config.preview_timeout_ms);
    let fetcher = Arc::new(HttpPageFetcher::new(config.preview_relay_url.clone(), timeout)?);
    let resolver = match &cache {
        Some(cache) => LinkPreviewResolver::new(fetcher)
            .with_cache(cache.clone(), config.preview_cache_ttl_seconds),
        None => LinkPreviewResolver::new(fetcher),
    };
    let geocoder: Arc<dyn Geocoder> = match &config.geocoder_url {
        Some(url) => Arc::new(HttpGeocoder::new(url.clone(), timeout)?),
        None => Arc::new(DisabledGeocoder),
    };
    let prefs = match &config.prefs_path {
        Some(path) => PrefsFile::new(path),
        None => PrefsFile::memory_only(),
    };

    let engine = MuralEngine::new(
        EngineDeps {
            store,
            reports,
            identity: IdentityStore::open(prefs).await,
            resolver,
            geocoder,
            clock,
        },
        MuralSettings::from_config(&config),
    )
    .await;
    engine.start().await?;

    let state = AppState {
        engine: engine.clone(),
        db,
        cache,
    };

    let app: Router = http::router(state).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!("listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.dispose().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

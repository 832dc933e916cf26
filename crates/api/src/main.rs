use anyhow::{Context, Result};
use handoff::{MemoryStore, TokenExchange};
use relay::{GcsObjectStore, HttpParseService, LocalObjectStore, ObjectStore, Relay};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod metrics;
mod response;
mod routes;

use config::{AppConfig, LogFormat, StorageBackend};
use metrics::Metrics;
use routes::AppState;

const DEFAULT_LOG_FILTER: &str = "api=info,relay=info,handoff=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    init_tracing(config.server.log_format);

    tracing::info!(version = routes::VERSION, "Starting PDF relay");
    tracing::info!(
        backend = ?config.storage.backend,
        bucket = %config.storage.bucket,
        parser = %config.parser.url,
        ttl_secs = config.handoff.ttl_secs,
        chunk_size = config.handoff.chunk_size,
        "Configuration loaded"
    );

    let storage: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::Gcs => Arc::new(GcsObjectStore::new(
            config.storage.endpoint.clone(),
            config.storage.bearer_token.clone(),
        )),
        StorageBackend::Local => Arc::new(LocalObjectStore::new(&config.storage.local_dir)),
    };
    let parser = HttpParseService::new(
        config.parser.url.clone(),
        Duration::from_secs(config.parser.request_timeout_secs),
    )
    .context("Failed to build parse service client")?;

    let relay = Relay::new(
        storage,
        Arc::new(parser),
        config.storage.bucket.clone(),
        config.retry_policy(),
    );

    let store = MemoryStore::new(config.handoff.max_entries, config.handoff.max_entry_bytes);
    let exchange = TokenExchange::new(Arc::new(store.clone()), config.handoff_settings());

    let state = Arc::new(AppState {
        relay,
        exchange,
        store: store.clone(),
        metrics: Metrics::new(),
    });

    // Editors load results cross-origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(state, config.server.max_upload_bytes)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let sweeper = tokio::spawn(sweep_expired(store, Duration::from_secs(config.handoff.ttl_secs)));

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    tracing::info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Expired entries are unreadable already; this only reclaims memory.
async fn sweep_expired(store: MemoryStore, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let purged = store.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "Swept expired cache entries");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

//! Waypost Proxy Server - Entry Point
//!
//! Starts the proxy listener and stops accepting on Ctrl+C or SIGTERM.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waypost::cache::{CacheStore, MemoryCacheStore, ResponseCache, SqliteCacheStore};
use waypost::config::{CacheBackend, CacheConfig, LogConfig};
use waypost::proxy::ProxyServer;
use waypost::{Config, Database, Result};

/// Caching forward HTTP proxy with HTTPS tunneling
#[derive(Parser, Debug)]
#[command(name = "waypost", version, about)]
struct Cli {
    /// IP address or hostname to listen on, e.g. localhost or 0.0.0.0 (overrides PROXY_HOST)
    host: Option<String>,

    /// Port to listen on (overrides PROXY_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// SQLite cache file (overrides CACHE_DB_PATH)
    #[arg(long)]
    cache_db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?.with_overrides(cli.host, cli.port, cli.cache_db);

    init_tracing(&config.log);
    info!("Starting Waypost Proxy Server");

    let (cache, db) = open_cache(&config.cache).await?;

    info!("Listening on {}", config.proxy_addr());
    info!(
        backend = config.cache.backend.as_str(),
        path = %config.cache.db_path,
        post_cache = config.cache.post_enabled,
        "Response cache ready"
    );
    info!("Supports: HTTP GET/POST + HTTPS tunneling");
    info!(
        "Configure your browser to use {} as HTTP and HTTPS proxy; for HTTP-only sites: http://{}/www.example.com",
        config.proxy_addr(),
        config.proxy_addr()
    );

    let proxy_server = ProxyServer::new(config.proxy.clone(), cache);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let proxy_task = tokio::spawn(async move {
        if let Err(e) = proxy_server.run(shutdown_rx).await {
            error!("Proxy server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = proxy_task.await;

    if let Some(db) = db {
        db.close().await;
    }

    info!("Waypost Proxy Server stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("waypost={}", log.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Open the configured page store and wrap it in the response cache
async fn open_cache(config: &CacheConfig) -> Result<(ResponseCache, Option<Database>)> {
    let (pages, db): (Arc<dyn CacheStore>, Option<Database>) = match config.backend {
        CacheBackend::Sqlite => {
            let db = Database::connect(config).await?;
            db.run_migrations().await?;
            let latency = db.health_check().await?;
            info!(latency_ms = latency.as_millis() as u64, "Cache database initialized");
            let store: Arc<dyn CacheStore> = Arc::new(SqliteCacheStore::new(db.pool().clone()));
            (store, Some(db))
        }
        CacheBackend::Memory => {
            let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
            (store, None)
        }
    };

    let cache = ResponseCache::new(pages);
    let cache = if config.post_enabled {
        cache.with_post_cache()
    } else {
        cache
    };

    Ok((cache, db))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use router_core::{
    CallbackSink, InMemoryResponseCache, RedisResponseCache, RouteRegistry, RouterConfig,
    RouterCore, SharedResponseCache, StatusPoller,
};
use router_db::SqliteSubmissionStore;
use router_drivers::{DriverSelector, EndpointDriver, RestDriver, SoapDriver};
use router_server::{routes, state::AppState};
use router_utils::route_config::load_route_config_doc;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to load route configuration: {0}")]
    ConfigLoadFailure(#[from] router_utils::route_config::RouteConfigError),
    #[error("invalid route configuration: {0}")]
    InvalidConfig(#[from] router_core::RouteRegistryError),
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache connection failed: {0}")]
    Cache(#[from] router_core::CacheError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config = RouterConfig::from_env();

    let route_config_path: String = router_utils::env_or("ROUTER_CONFIG_PATH", "./router.toml".to_string());
    let route_doc = load_route_config_doc(&PathBuf::from(&route_config_path))?;
    let registry = Arc::new(RouteRegistry::new(&route_doc)?);

    let mut drivers: HashMap<String, Arc<dyn EndpointDriver>> = HashMap::new();
    drivers.insert("REST".to_string(), Arc::new(RestDriver::new()));
    drivers.insert("SOAP".to_string(), Arc::new(SoapDriver::new()));
    let selector = Arc::new(DriverSelector::new(drivers));

    for route in registry.all() {
        if selector.resolve(&route.endpoint_type).is_err() {
            tracing::error!(
                route_id = %route.route_id,
                endpoint_type = %route.endpoint_type,
                "unrecognised endpointType, refusing to start"
            );
            return Err(StartupError::InvalidConfig(
                router_core::RouteRegistryError::InvalidConfig(format!(
                    "unrecognised endpointType '{}' for route '{}'",
                    route.endpoint_type, route.route_id
                )),
            ));
        }
    }

    let database_url: String =
        router_utils::env_or("ROUTER_DATABASE_URL", "sqlite://router.db".to_string());
    let pool = router_db::connect(&database_url, router_db::get_max_connections()).await?;
    let store: Arc<dyn router_db::SubmissionStore> = Arc::new(SqliteSubmissionStore::new(pool));

    let cache: SharedResponseCache = match std::env::var("ROUTER_REDIS_URL") {
        Ok(redis_url) if !redis_url.is_empty() => {
            tracing::info!("using Redis response cache");
            Arc::new(RedisResponseCache::connect(&redis_url).await?) as SharedResponseCache
        }
        _ => {
            tracing::info!("using in-memory response cache");
            Arc::new(InMemoryResponseCache::new()) as SharedResponseCache
        }
    };

    let core = Arc::new(RouterCore::new(
        registry.clone(),
        store.clone(),
        selector.clone(),
        cache,
        config.clone(),
    ));
    let callback_sink = Arc::new(CallbackSink::new(core.clone()));

    let poller = StatusPoller::new(
        core.clone(),
        store.clone(),
        registry.clone(),
        selector.clone(),
        config.poller_concurrency,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poller_handle = tokio::spawn(async move {
        poller.run(config.poller_interval, shutdown_rx).await;
    });

    let app = routes::router(AppState { core, callback_sink });

    let host: String = router_utils::env_or("HOST", "127.0.0.1".to_string());
    let port: u16 = router_utils::env_or("PORT", 8080u16);
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!("router listening on http://{host}:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down status poller");
    let _ = shutdown_tx.send(true);
    let _ = poller_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
            } else {
                tracing::error!("failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}

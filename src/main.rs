use catalog_search::{
    api::{build_router, AppState},
    config::{CacheBackend, CatalogBackend, Config},
    search::{
        AnalyticsEmitter, CacheStore, CatalogStore, ConnectionManager, HttpBackendSettings,
        HttpCatalogStore, HttpSearchBackend, InMemoryCatalog, MemoryCacheStore, RedisCacheStore,
        SearchCache, SearchService, TracingAnalyticsSink,
    },
};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "catalog_search={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });
    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting Catalog Search v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = catalog_search::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    // Connect to the search backend
    let (username, password) = config.backend.credentials();
    let backend = HttpSearchBackend::new(HttpBackendSettings {
        base_url: config.backend.base_url.clone(),
        username,
        password,
        request_timeout: config.backend.request_timeout(),
    })
    .context("Failed to create search backend client")?;
    let connection = Arc::new(ConnectionManager::new(
        Arc::new(backend),
        config.backend.retry_policy(),
        config.backend.health_check_interval(),
    ));

    let snapshot = connection
        .connect()
        .await
        .context("Search backend unreachable")?;
    tracing::info!(
        state = %snapshot.state,
        health = %snapshot.health,
        "Connected to search backend at {}",
        config.backend.base_url
    );

    let shutdown = CancellationToken::new();
    let health_handle = connection.spawn_health_monitor(shutdown.child_token());

    let cache = build_cache(&config).await;
    let catalog = build_catalog(&config)?;

    let (analytics, analytics_handle) = if config.analytics.enabled {
        let (emitter, handle) =
            AnalyticsEmitter::spawn(Arc::new(TracingAnalyticsSink), config.analytics.queue_size);
        (emitter, Some(handle))
    } else {
        tracing::info!("Search analytics disabled in configuration");
        (AnalyticsEmitter::disabled(), None)
    };

    let service = Arc::new(SearchService::new(
        config.search.clone(),
        connection.clone(),
        cache,
        catalog,
        analytics,
    ));

    let app = build_router(AppState::new(service));

    // Start HTTP server
    let http_addr = config.server.bind_addr();
    let http_listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", http_addr))?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Search API: http://{}/v1/search", http_addr);
    tracing::info!("   Metrics: http://{}/metrics", http_addr);

    let server_shutdown = shutdown.clone();
    axum::serve(http_listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                }
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await?;

    tracing::info!("Shutting down gracefully...");
    shutdown.cancel();
    let _ = health_handle.await;

    // The router held the last emitter; the consumer drains and exits
    if let Some(handle) = analytics_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            tracing::warn!("Analytics consumer did not drain in time");
        }
    }

    Ok(())
}

/// Result cache; an unreachable Redis degrades to no caching
async fn build_cache(config: &Config) -> SearchCache {
    if !config.cache.enabled {
        tracing::info!("Result cache disabled in configuration");
        return SearchCache::disabled();
    }

    let store: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryCacheStore::new(
            config.cache.max_capacity,
            config.cache.ttl(),
        )),
        CacheBackend::Redis => {
            let url = config.cache.redis_url.as_deref().unwrap_or_default();
            match RedisCacheStore::connect(url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!("Redis cache unavailable: {}", e);
                    tracing::warn!("Continuing without result cache");
                    return SearchCache::disabled();
                }
            }
        }
    };

    tracing::info!("Result cache initialized ({})", store.name());
    SearchCache::new(store, config.cache.ttl(), config.cache.key_prefix.clone())
}

fn build_catalog(config: &Config) -> anyhow::Result<Arc<dyn CatalogStore>> {
    let catalog: Arc<dyn CatalogStore> = match config.catalog.backend {
        CatalogBackend::Memory => Arc::new(InMemoryCatalog::new()),
        CatalogBackend::Http => {
            let base_url = config.catalog.base_url.clone().unwrap_or_default();
            Arc::new(HttpCatalogStore::new(
                base_url,
                Duration::from_millis(config.catalog.timeout_ms),
            )
            .context("Failed to create catalog client")?)
        }
    };
    Ok(catalog)
}

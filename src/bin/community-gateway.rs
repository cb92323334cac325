//! Community Gateway server binary
//!
//! Wires the pipeline in dependency order: configuration, token service, rate
//! limit store, filters, route table, forwarder, then the HTTP listener.

use community_gateway::{
    api::{build_router, AppState},
    config::{loader, Config, RateLimitStoreKind},
    gateway::{Gateway, HttpForwarder, RouteTable, StaticBackendLocator},
    middleware::{AuthFilter, PublicPaths, RateLimitFilter, TenantFilter},
    observability::{init_observability, HealthChecker, MetricsCollector},
    rate_limit::{InMemoryRateLimitStore, LazyRedis, RateLimitStore, RateLimiter, RedisRateLimitStore},
    shutdown::shutdown_signal,
    token::{InMemoryRevocationList, RedisRevocationList, TokenRevocationList, TokenService},
};
use anyhow::Context;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = loader::config_path();
    let config = Config::from_file_with_env(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    init_observability(&config.logging.level, &config.logging.format);
    info!(path = %config_path.display(), "Configuration loaded and validated");

    let metrics = Arc::new(MetricsCollector::new());
    let tokens = Arc::new(TokenService::new(&config.jwt));

    // Redis connects on first use, so startup does not depend on it
    let redis = match &config.rate_limit.redis_url {
        Some(url) => Some(Arc::new(LazyRedis::open(url).context("invalid redis_url")?)),
        None => None,
    };

    let mut janitor = None;
    let store: Arc<dyn RateLimitStore> = match (config.rate_limit.store, &redis) {
        (RateLimitStoreKind::Redis, Some(redis)) => Arc::new(RedisRateLimitStore::new(redis.clone())),
        _ => {
            let store = Arc::new(InMemoryRateLimitStore::new());
            janitor = Some(
                store
                    .clone()
                    .start_cleanup_task(Duration::from_secs(config.rate_limit.window_secs)),
            );
            store
        }
    };
    info!(backend = store.backend_name(), limit = config.rate_limit.limit, window_secs = config.rate_limit.window_secs, "Rate limiter initialized");

    let limiter = Arc::new(
        RateLimiter::new(store.clone(), config.rate_limit.key_prefix.clone())
            .with_store_timeout(Duration::from_millis(config.rate_limit.store_timeout_ms))
            .with_metrics(metrics.clone()),
    );
    let rate_limit = RateLimitFilter::new(limiter, config.rate_limit.clone()).with_metrics(metrics.clone());

    let mut auth = AuthFilter::new(tokens, PublicPaths::new(config.auth.public_paths.clone()))
        .with_revocation_timeout(Duration::from_millis(config.auth.revocation_timeout_ms))
        .with_metrics(metrics.clone());
    if config.auth.check_revocation {
        let revocation: Arc<dyn TokenRevocationList> = match &redis {
            Some(redis) => Arc::new(RedisRevocationList::new(redis.clone())),
            None => Arc::new(InMemoryRevocationList::default()),
        };
        auth = auth.with_revocation(revocation);
    }

    let routes = Arc::new(RouteTable::from_config(&config.routes));
    info!(routes = routes.len(), "Route table loaded");

    let max_body_bytes = match config.server.max_body_size_mb {
        0 => usize::MAX,
        mb => mb * 1024 * 1024,
    };
    let locator = Arc::new(StaticBackendLocator::new(config.backends.clone()));
    let forwarder = HttpForwarder::new(
        locator,
        Duration::from_secs(config.server.upstream_timeout_secs),
        max_body_bytes,
    )?
    .with_metrics(metrics.clone());

    let gateway = Gateway::new(
        routes.clone(),
        rate_limit,
        TenantFilter::default(),
        auth,
        Arc::new(forwarder),
        metrics.clone(),
    )
    .trust_forwarded_for(config.server.trust_forwarded_for);

    let mut health_checker = HealthChecker::new().with_route_count(routes.len());
    if config.rate_limit.enabled {
        health_checker = health_checker.with_rate_limit_store(store);
    }

    let state = AppState {
        gateway: Arc::new(gateway),
        health_checker: Arc::new(health_checker),
        metrics,
    };
    let app = build_router(state, max_body_bytes);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server host/port")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Gateway listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(janitor) = janitor {
        janitor.abort();
    }
    info!("Server shutdown complete");

    Ok(())
}

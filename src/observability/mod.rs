//! Observability: logging, metrics and health

pub mod health;
pub mod metrics;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use health::{ComponentHealth, HealthChecker, HealthStatus, SystemHealth};
pub use metrics::{MetricsCollector, SystemMetrics};

/// Initialize logging; `RUST_LOG` overrides the configured level
pub fn init_observability(log_level: &str, format: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
        "compact" => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

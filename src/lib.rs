pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod router;
pub mod server;

use crate::config::{LogFormat, RouterConfig};
use crate::error::{Result, RouterError};
use crate::metrics::MetricsService;
use crate::router::ProviderRouter;
use crate::server::AppState;
use std::time::Duration;
use tracing::{info, warn};

/// Initialize the analysis service
pub async fn init_service(config: RouterConfig) -> Result<()> {
    config.validate()?;

    info!("Starting analysis router");
    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );

    let router = ProviderRouter::from_config(&config)?;
    if router.is_offline() {
        warn!("Offline mode enabled, primary provider will not be called");
    } else {
        info!(
            endpoint = %config.primary.endpoint,
            failure_threshold = config.circuit_breaker.failure_threshold,
            cooldown_secs = config.circuit_breaker.cooldown_secs,
            "Primary provider configured"
        );
    }

    let metrics = match MetricsService::new() {
        Ok(service) => Some(service),
        Err(e) => {
            warn!(error = %e, "Metrics disabled");
            None
        }
    };

    let state = AppState::new(
        router,
        metrics,
        Duration::from_secs(config.server.timeout_secs),
    );
    let app = server::app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(RouterError::Io)?;

    info!("Analysis router ready to accept connections");

    axum::serve(listener, app)
        .await
        .map_err(|e| RouterError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

/// Initialize tracing/logging
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "analysis_router=debug,tower_http=debug".into());

    match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .init(),
    }
}

use crate::error::{Result, RouterError};
use crate::metrics::MetricsService;
use crate::provider::{AnalysisRequest, AnalysisResult};
use crate::router::{ProviderRouter, RouterStatus};
use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::State,
    http::{header, Response, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    BoxError, Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProviderRouter>,
    pub metrics: Option<MetricsService>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        router: ProviderRouter,
        metrics: Option<MetricsService>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            router: Arc::new(router),
            metrics,
            request_timeout,
        }
    }
}

/// Build the HTTP application
pub fn app(state: AppState) -> Router {
    let request_timeout = state.request_timeout;

    Router::new()
        .route("/api/analyze", post(analyze_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
}

async fn handle_timeout_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "Request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unhandled internal error: {}", err),
        )
    }
}

/// Analyze text; answers 200 even when the primary is down
pub async fn analyze_handler(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisResult>> {
    let request_id = Uuid::new_v4();
    let span = info_span!("analyze", request_id = %request_id);

    let result = state.router.analyze(&request).instrument(span.clone()).await?;

    span.in_scope(|| {
        info!(
            provider = %result.provider,
            degraded = result.degraded,
            emotion = %result.emotion,
            "Analysis complete"
        );
    });

    Ok(Json(result))
}

/// Breaker state and provider hints
pub async fn health_handler(State(state): State<AppState>) -> Json<RouterStatus> {
    Json(state.router.status())
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(state): State<AppState>) -> Result<Response<Body>> {
    let Some(metrics) = state.metrics else {
        return Ok((StatusCode::NOT_FOUND, "metrics disabled").into_response());
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(metrics.render()))
        .map_err(|e| RouterError::Internal(format!("Failed to build metrics response: {}", e)))
}

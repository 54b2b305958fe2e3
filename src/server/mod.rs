// HTTP surface of the analysis proxy

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, instrument};

use crate::core::config::Config;
use crate::core::errors::{ProxyError, ProxyResult};
use crate::core::types::{AnalysisResult, AnalyzeRequest, ErrorBody, ANALYSIS_FAILED_MESSAGE};
use crate::services::vision::{parse_model_reply, VisionClient};
use crate::utils::Metrics;

pub const ANALYZE_ROUTE: &str = "/api/analyze-food";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub vision: Arc<VisionClient>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Arc<Config>, metrics: Metrics) -> anyhow::Result<Self> {
        let vision = VisionClient::new(config.clone(), None, Some(metrics.clone()))?;
        Ok(Self {
            config,
            vision: Arc::new(vision),
            metrics,
        })
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        error!("Analysis error: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: ANALYSIS_FAILED_MESSAGE.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.max_body_bytes();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route(ANALYZE_ROUTE, post(analyze_food))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
}

async fn root() -> &'static str {
    "Food analysis proxy"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.config.vision_model(),
        "upstream_circuit": state.vision.circuit_breaker().state(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

async fn stats_endpoint(State(state): State<AppState>) -> Json<crate::utils::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// `POST /api/analyze-food`
///
/// The body is read and decoded by hand so that an oversized or malformed request is reported
/// like any other failure: HTTP 500 with `{ "error": ... }`.
#[instrument(skip(state, body))]
async fn analyze_food(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> ProxyResult<Json<AnalysisResult>> {
    let start = Instant::now();
    state.metrics.record_endpoint_request(ANALYZE_ROUTE);

    let result = match body {
        Ok(body) => run_analysis(&state, &body).await,
        Err(rejection) => Err(ProxyError::InvalidRequest(rejection.body_text())),
    };
    match &result {
        Ok(analysis) => info!(
            "Analysis completed in {:.2}s: {} ingredients",
            start.elapsed().as_secs_f64(),
            analysis.ingredients.len()
        ),
        Err(_) => state.metrics.record_analysis_failure(),
    }
    result.map(Json)
}

async fn run_analysis(state: &AppState, body: &[u8]) -> ProxyResult<AnalysisResult> {
    let request: AnalyzeRequest =
        serde_json::from_slice(body).map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

    let preview: String = request.image_url.chars().take(100).collect();
    info!("Received image URL: {}...", preview);

    let reply = state.vision.analyze_image(&request.image_url).await?;
    let (result, source) = parse_model_reply(reply.content.as_deref());
    info!("Parsed model reply via {:?}: {} ingredients", source, result.ingredients.len());

    state.metrics.record_analysis(source, result.ingredients.len());
    Ok(result)
}

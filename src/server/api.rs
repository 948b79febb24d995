//! HTTP API server implementation

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::core::client::BlessingGenerator;
use crate::core::config::AppConfig;
use crate::core::errors::{CompletionError, GateError, ValidationError};
use crate::core::identity::client_identity;
use crate::core::models::{BlessingResponse, GenerationOptions, RateLimitResult};
use crate::core::rate_limit::AdmissionGate;
use crate::core::usage_monitor::{UsageMonitor, DEFAULT_MAX_IDLE};
use crate::core::validation::{sanitize, validate};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub const MSG_BAD_REQUEST: &str = "请求格式错误";
pub const MSG_GENERIC_FAILURE: &str = "生成祝福语失败，请稍后重试";
pub const MSG_UPSTREAM_BUSY: &str = "请求过于频繁，请稍后再试";
pub const MSG_UPSTREAM_DOWN: &str = "服务暂时不可用，请稍后再试";
pub const MSG_TIMEOUT: &str = "请求超时，请重试";
pub const MSG_MISCONFIGURED: &str = "服务配置错误，请联系管理员";
pub const MSG_LIMITER_DOWN: &str = "服务暂时不可用，请稍后重试";

/// Application state
pub struct AppState {
    generator: BlessingGenerator,
    gate: AdmissionGate,
    monitor: UsageMonitor,
}

impl AppState {
    pub fn new(generator: BlessingGenerator, gate: AdmissionGate, monitor: UsageMonitor) -> Self {
        Self {
            generator,
            gate,
            monitor,
        }
    }

    /// Build every service from configuration
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let generator = BlessingGenerator::from_config(config)?;
        let gate = AdmissionGate::from_config(config)?;
        Ok(Self::new(generator, gate, UsageMonitor::new()))
    }
}

/// Health check response
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    service: String,
    version: String,
    total_requests: u64,
    total_errors: u64,
}

/// Error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Rate limit rejection body
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitErrorResponse {
    pub error: String,
    pub reset_time: i64,
    pub limit: u64,
}

/// Request failures, mapped to user-safe responses
#[derive(Debug)]
pub enum ApiError {
    BadRequest,
    Validation(ValidationError),
    RateLimited(RateLimitResult),
    Completion(CompletionError),
    LimiterUnavailable(GateError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Completion(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::LimiterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Message shown to callers for a completion failure; provider details stay in the logs
pub fn safe_error_message(err: &CompletionError) -> &'static str {
    match err {
        CompletionError::Configuration { .. } => MSG_MISCONFIGURED,
        CompletionError::Api { status: 429, .. } => MSG_UPSTREAM_BUSY,
        CompletionError::Api { status, .. } if *status >= 500 => MSG_UPSTREAM_DOWN,
        CompletionError::Timeout => MSG_TIMEOUT,
        _ => MSG_GENERIC_FAILURE,
    }
}

fn rate_limit_headers(result: &RateLimitResult) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let pairs = [
        ("x-ratelimit-limit", result.limit.to_string()),
        ("x-ratelimit-remaining", result.remaining.to_string()),
        ("x-ratelimit-reset", result.reset_at.to_string()),
    ];

    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    headers
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self {
            ApiError::RateLimited(result) => {
                let mut headers = rate_limit_headers(&result);
                let retry_after = (result.reset_at - chrono::Utc::now().timestamp()).max(1);
                if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                    headers.insert(header::RETRY_AFTER, value);
                }

                let body = RateLimitErrorResponse {
                    error: result.error_message.unwrap_or_default(),
                    reset_time: result.reset_at,
                    limit: result.limit,
                };
                (status, headers, Json(body)).into_response()
            }
            ApiError::BadRequest => error_body(status, MSG_BAD_REQUEST),
            ApiError::Validation(e) => error_body(status, e.message),
            ApiError::Completion(e) => error_body(status, safe_error_message(&e)),
            ApiError::LimiterUnavailable(_) => error_body(status, MSG_LIMITER_DOWN),
        }
    }
}

fn error_body(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

#[derive(OpenApi)]
#[openapi(
    paths(blessing, health_check),
    components(schemas(
        GenerationOptions,
        BlessingResponse,
        ErrorResponse,
        RateLimitErrorResponse,
        HealthResponse
    ))
)]
pub struct ApiDoc;

/// Health check handler
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let summary = state.monitor.summary().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        total_requests: summary.total_requests,
        total_errors: summary.total_errors,
    })
}

/// OpenAPI document handler
async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Rate limit status for the caller, without consuming quota
async fn rate_limit_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RateLimitResult>, ApiError> {
    let client_id = client_identity(&headers);
    let status = state
        .gate
        .status(&client_id)
        .await
        .map_err(ApiError::LimiterUnavailable)?;
    Ok(Json(status))
}

async fn process_blessing(
    state: &AppState,
    client_id: &str,
    payload: Result<Json<GenerationOptions>, JsonRejection>,
) -> Result<(RateLimitResult, String), ApiError> {
    let admission = state
        .gate
        .check(client_id)
        .await
        .map_err(ApiError::LimiterUnavailable)?;
    if !admission.admitted {
        return Err(ApiError::RateLimited(admission));
    }

    let Json(options) = payload.map_err(|e| {
        debug!("Rejected request body: {}", e);
        ApiError::BadRequest
    })?;

    let options = sanitize(&options);
    validate(&options).map_err(ApiError::Validation)?;

    let blessing = state
        .generator
        .generate(&options)
        .await
        .map_err(ApiError::Completion)?;

    Ok((admission, blessing.trim().to_string()))
}

/// Blessing generation handler
#[utoipa::path(
    post,
    path = "/api/blessing",
    request_body = GenerationOptions,
    responses(
        (status = 200, description = "Generated blessing", body = BlessingResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitErrorResponse),
        (status = 500, description = "Generation failed", body = ErrorResponse),
        (status = 503, description = "Rate limiter unavailable", body = ErrorResponse)
    )
)]
async fn blessing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<GenerationOptions>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let client_id = client_identity(&headers);

    let result = process_blessing(&state, &client_id, payload).await;

    let elapsed = started.elapsed();
    state.monitor.track(&client_id, elapsed, result.is_err()).await;

    match result {
        Ok((admission, blessing)) => {
            info!(
                "POST /api/blessing 200 {}ms client={}",
                elapsed.as_millis(),
                client_id
            );
            (
                StatusCode::OK,
                rate_limit_headers(&admission),
                Json(BlessingResponse { blessing }),
            )
                .into_response()
        }
        Err(e) => {
            let status = e.status();
            match &e {
                ApiError::Completion(err) => error!(
                    "POST /api/blessing {} {}ms client={} error={}",
                    status.as_u16(),
                    elapsed.as_millis(),
                    client_id,
                    err
                ),
                ApiError::LimiterUnavailable(err) => error!(
                    "POST /api/blessing {} {}ms client={} error={}",
                    status.as_u16(),
                    elapsed.as_millis(),
                    client_id,
                    err
                ),
                other => warn!(
                    "POST /api/blessing {} {}ms client={} rejected={:?}",
                    status.as_u16(),
                    elapsed.as_millis(),
                    client_id,
                    other
                ),
            }
            e.into_response()
        }
    }
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/blessing", post(blessing))
        .route("/api/rate-limit", get(rate_limit_status))
        .route("/api-docs/openapi.json", get(openapi))
        .with_state(state)
}

/// Periodic sweep of expired counters and idle usage records
fn spawn_maintenance(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let evicted = state.gate.evict_expired().await;
            let dropped = state.monitor.cleanup(DEFAULT_MAX_IDLE).await;
            debug!(
                "Maintenance: evicted {} counters, dropped {} idle clients",
                evicted, dropped
            );

            for stats in state.monitor.all_stats().await.iter().take(5) {
                debug!(
                    "Client {}: {} requests, {:.0}ms avg, {:.0}% errors",
                    stats.client_id,
                    stats.usage.requests,
                    stats.avg_duration_ms,
                    stats.error_rate * 100.0
                );
            }
        }
    });
}

/// Run the HTTP server
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;
    config.log_summary();

    let state = Arc::new(AppState::from_config(&config)?);
    spawn_maintenance(state.clone());

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

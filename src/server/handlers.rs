//! Route handlers.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use opentelemetry::KeyValue;
use serde_json::json;
use tracing::{error, info, warn};

use super::AppState;
use crate::error::ErrorClass;
use crate::health::{DashboardStats, HealthReport};
use crate::instrument::{AiRequestInstrumentor, InstrumentedRequest, InstrumentedResponse};
use crate::quality;
use crate::telemetry::MetricRegistry;
use crate::telemetry::exposition::CONTENT_TYPE;

/// Detail returned when the model call fails; internals are logged, not leaked.
const GENERIC_FAILURE: &str = "An error occurred while processing your request. Please try again.";

// ============================================================================
// Errors
// ============================================================================

/// Handler error, rendered as `{"detail": ...}` with its status code.
#[derive(Debug, thiserror::Error)]
#[error("{detail}")]
pub struct ApiError {
    status: StatusCode,
    kind: String,
    detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "InvalidInput".to_string(),
            detail: detail.into(),
        }
    }

    /// A 500 that keeps the kind of the underlying failure for metrics.
    pub fn internal(cause: &dyn ErrorClass, detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: cause.error_kind().to_owned(),
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl ErrorClass for ApiError {
    fn error_kind(&self) -> &str {
        &self.kind
    }

    fn status_code(&self) -> u16 {
        self.status.as_u16()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub model_version: String,
    pub quality_score: f64,
    pub response_time_ms: f64,
}

impl InstrumentedResponse for Json<ChatResponse> {
    fn response_length(&self) -> usize {
        self.response.chars().count()
    }
}

/// Chat body plus the transport-level user agent.
struct ChatInput {
    request: ChatRequest,
    header_agent: Option<String>,
}

impl InstrumentedRequest for ChatInput {
    fn payload(&self) -> Option<&str> {
        Some(&self.request.prompt)
    }

    fn caller(&self) -> Option<&str> {
        self.request
            .user_agent
            .as_deref()
            .or(self.header_agent.as_deref())
    }
}

/// `POST /api/mental-health`
pub async fn mental_health(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let header_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let input = ChatInput {
        request,
        header_agent,
    };
    state.chat.run(input, |input| chat(&state, input)).await
}

async fn chat(state: &AppState, input: ChatInput) -> Result<Json<ChatResponse>, ApiError> {
    let start = Instant::now();
    let ChatRequest {
        prompt, session_id, ..
    } = input.request;
    let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if prompt.trim().is_empty() {
        warn!(session_id, "empty input received");
        return Err(ApiError::bad_request("No input provided"));
    }

    let telemetry = &state.telemetry;
    telemetry.sessions().mark_start(&session_id);

    let model = state.generator.model().to_owned();
    let ai = AiRequestInstrumentor::new(telemetry.clone(), model.clone());
    let reply = match ai
        .run(state.store.process_input(&session_id, &prompt, state.generator.as_ref()))
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            error!(session_id, error = %e, "failed to process chat request");
            telemetry.sessions().mark_end(&session_id);
            return Err(ApiError::internal(&e, GENERIC_FAILURE));
        }
    };

    let quality_score = quality::score(&reply);
    let message_count = state.store.message_count(&session_id).await;
    telemetry.track_conversation(&session_id, message_count, None);

    let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        session_id,
        response_time_ms,
        quality_score,
        "chat request completed"
    );

    Ok(Json(ChatResponse {
        response: reply,
        session_id,
        model_version: model,
        quality_score,
        response_time_ms,
    }))
}

// ============================================================================
// End conversation
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct EndConversationRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub satisfaction_score: Option<f64>,
}

/// `POST /api/end-conversation`
///
/// A conversation counts as completed only when a satisfaction score is
/// supplied.
pub async fn end_conversation(
    State(state): State<AppState>,
    Json(request): Json<EndConversationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(session_id) = request.session_id.filter(|id| !id.is_empty()) else {
        return Err(ApiError::bad_request("Session ID required"));
    };

    state.telemetry.sessions().mark_end(&session_id);
    let message_count = state.store.end(&session_id).await;
    if let Some(score) = request.satisfaction_score {
        state
            .telemetry
            .track_conversation(&session_id, message_count, Some(score));
    }

    info!(
        session_id,
        satisfaction = ?request.satisfaction_score,
        "conversation ended"
    );
    Ok(Json(json!({ "message": "Conversation ended successfully" })))
}

// ============================================================================
// Monitoring
// ============================================================================

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let sample = match state.sampler.sample().await {
        Ok(sample) => Some(sample),
        Err(e) => {
            warn!(error = %e, "resource sampling failed during health check");
            None
        }
    };
    Json(HealthReport::evaluate(
        &state.telemetry,
        sample.as_ref(),
        state.exposition.is_some(),
    ))
}

/// `GET /metrics`
///
/// Refreshes the resource gauges first; a failed sample leaves the last
/// values in place.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.sampler.sample().await {
        Ok(sample) => MetricRegistry::record_resources(&sample),
        Err(e) => warn!(error = %e, "resource sampling failed during scrape"),
    }

    let body = state
        .exposition
        .as_ref()
        .map(|exposition| exposition.render())
        .unwrap_or_default();
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}

/// `GET /metrics/custom`
pub async fn custom_metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "active_sessions": state.telemetry.sessions().active_count(),
        "tracing_exporter": state.telemetry.exporter().as_str(),
    }))
}

/// `GET /stats/dashboard`
pub async fn dashboard(State(state): State<AppState>) -> Json<DashboardStats> {
    Json(DashboardStats::collect(
        &state.telemetry,
        state.exposition.is_some(),
    ))
}

// ============================================================================
// Debug
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugTrace {
    pub message: String,
    /// `None` when tracing is disabled.
    pub trace_id: Option<String>,
}

/// `GET /debug/trace`
///
/// Emits one `debug_trace` span so an operator can find it in the backend.
pub async fn debug_trace(State(state): State<AppState>) -> Json<DebugTrace> {
    let span = state
        .telemetry
        .start_span("debug_trace", vec![KeyValue::new("debug.test", true)]);
    let trace_id = span.trace_id();
    info!(trace_id = trace_id.as_deref().unwrap_or("-"), "debug trace generated");
    span.ok();

    Json(DebugTrace {
        message: "Trace generated".to_string(),
        trace_id,
    })
}

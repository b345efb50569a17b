//! HTTP service: routes, shared state, and daemon configuration.
//!
//! | Route                        | Handler                                   |
//! |------------------------------|-------------------------------------------|
//! | `POST /api/mental-health`    | [`handlers::mental_health`] (instrumented) |
//! | `POST /api/end-conversation` | [`handlers::end_conversation`]            |
//! | `GET /health`                | [`handlers::health`]                      |
//! | `GET /metrics`               | [`handlers::metrics`]                     |
//! | `GET /metrics/custom`        | [`handlers::custom_metrics`]              |
//! | `GET /stats/dashboard`       | [`handlers::dashboard`]                   |
//! | `GET /debug/trace`           | [`handlers::debug_trace`]                 |

pub mod config;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::conversation::ConversationStore;
use crate::generator::TextGenerator;
use crate::instrument::RequestInstrumentor;
use crate::resources::ResourceSampler;
use crate::telemetry::{PrometheusExposition, TelemetryContext};

pub use handlers::ApiError;

/// Route of the chat endpoint, also its `endpoint` label.
pub const CHAT_ROUTE: &str = "/api/mental-health";

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<TelemetryContext>,
    pub store: Arc<ConversationStore>,
    pub generator: Arc<dyn TextGenerator>,
    pub sampler: Arc<dyn ResourceSampler>,
    pub exposition: Option<PrometheusExposition>,
    chat: RequestInstrumentor,
}

impl AppState {
    pub fn new(
        telemetry: Arc<TelemetryContext>,
        store: Arc<ConversationStore>,
        generator: Arc<dyn TextGenerator>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Self {
        let chat = RequestInstrumentor::new(telemetry.clone(), "mental_health_chat", "POST", CHAT_ROUTE);
        Self {
            telemetry,
            store,
            generator,
            sampler,
            exposition: None,
            chat,
        }
    }

    /// Serve `GET /metrics` from this exposition.
    pub fn exposition(mut self, exposition: PrometheusExposition) -> Self {
        self.exposition = Some(exposition);
        self
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CHAT_ROUTE, post(handlers::mental_health))
        .route("/api/end-conversation", post(handlers::end_conversation))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/custom", get(handlers::custom_metrics))
        .route("/stats/dashboard", get(handlers::dashboard))
        .route("/debug/trace", get(handlers::debug_trace))
        .with_state(state)
}

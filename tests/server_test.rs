//! HTTP service tests, driven through the router with `tower::ServiceExt`.
#![cfg(feature = "server")]

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::TracerProvider;
use serde_json::{Value, json};
use tower::ServiceExt;

use companion::conversation::ConversationStore;
use companion::generator::TextGenerator;
use companion::resources::{ResourceSample, ResourceSampler};
use companion::server::{AppState, router};
use companion::telemetry::{self, ExporterKind, PrometheusExposition, TelemetryContext};
use companion::{CompanionError, Result};

// ============================================================================
// Test doubles
// ============================================================================

struct MockGenerator {
    reply: Option<&'static str>,
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.reply
            .map(str::to_string)
            .ok_or_else(|| CompanionError::Http("connection reset".to_string()))
    }
}

struct FixedSampler(Option<ResourceSample>);

#[async_trait]
impl ResourceSampler for FixedSampler {
    async fn sample(&self) -> Result<ResourceSample> {
        self.0
            .ok_or_else(|| CompanionError::Sampling("procfs unavailable".to_string()))
    }
}

const CALM: ResourceSample = ResourceSample {
    memory_percent: 40.0,
    memory_available_gb: 6.5,
    cpu_percent: 10.0,
    disk_percent: 55.0,
};

const REPLY: &str = "I understand how you feel, and I am here to support you.";

struct Harness {
    app: Router,
    telemetry: Arc<TelemetryContext>,
}

fn harness(reply: Option<&'static str>, sample: Option<ResourceSample>) -> Harness {
    let telemetry = Arc::new(TelemetryContext::disabled("test-service"));
    let state = AppState::new(
        telemetry.clone(),
        Arc::new(ConversationStore::default()),
        Arc::new(MockGenerator { reply }),
        Arc::new(FixedSampler(sample)),
    );
    Harness {
        app: router(state),
        telemetry,
    }
}

// ============================================================================
// Request helpers
// ============================================================================

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "test-agent/1.0")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

fn recorded<F: Future>(fut: F) -> (F::Output, SnapshotVec) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let output = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
    });
    (output, snapshotter.snapshot().into_vec())
}

fn counter_with(snapshot: &SnapshotVec, name: &str, labels: &[(&str, &str)]) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && labels.iter().all(|(k, v)| {
                    key.key()
                        .labels()
                        .any(|label| label.key() == *k && label.value() == *v)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn chat_returns_reply_and_records_request() {
    let harness = harness(Some(REPLY), Some(CALM));

    let ((status, body), snapshot) = recorded(send(
        &harness.app,
        post_json("/api/mental-health", json!({ "prompt": "I feel low", "session_id": "s1" })),
    ));

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], REPLY);
    assert_eq!(body["session_id"], "s1");
    assert_eq!(body["model_version"], "mock-model");
    assert_eq!(body["quality_score"], 0.8);
    assert!(body["response_time_ms"].as_f64().unwrap() >= 0.0);

    assert_eq!(harness.telemetry.sessions().active_count(), 1);
    assert_eq!(
        counter_with(
            &snapshot,
            telemetry::REQUESTS_TOTAL,
            &[
                ("endpoint", "/api/mental-health"),
                ("status_code", "200"),
                ("user_agent", "test-agent/1.0"),
            ]
        ),
        1
    );
    assert_eq!(
        counter_with(
            &snapshot,
            telemetry::AI_REQUESTS_TOTAL,
            &[("model_name", "mock-model"), ("status", "success")]
        ),
        1
    );
    assert_eq!(
        counter_with(
            &snapshot,
            telemetry::CONVERSATIONS_TOTAL,
            &[("completion_status", "ongoing")]
        ),
        1
    );
}

#[tokio::test]
async fn chat_without_session_id_gets_one() {
    let harness = harness(Some(REPLY), Some(CALM));

    let (status, body) = send(
        &harness.app,
        post_json("/api/mental-health", json!({ "prompt": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let session_id = body["session_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(session_id).is_ok());
    assert!(harness.telemetry.sessions().contains(session_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn empty_prompt_is_rejected() {
    let harness = harness(Some(REPLY), Some(CALM));

    let ((status, body), snapshot) = recorded(send(
        &harness.app,
        post_json("/api/mental-health", json!({ "prompt": "   ", "session_id": "s1" })),
    ));

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "No input provided");
    assert_eq!(harness.telemetry.sessions().active_count(), 0);
    assert_eq!(
        counter_with(&snapshot, telemetry::REQUESTS_TOTAL, &[("status_code", "500")]),
        1
    );
    assert_eq!(
        counter_with(
            &snapshot,
            telemetry::ERRORS_TOTAL,
            &[("error_kind", "InvalidInput"), ("component", "api")]
        ),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn generator_failure_is_a_generic_500() {
    let harness = harness(None, Some(CALM));

    let ((status, body), snapshot) = recorded(send(
        &harness.app,
        post_json("/api/mental-health", json!({ "prompt": "hello", "session_id": "s1" })),
    ));

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(!detail.contains("connection reset"));
    assert_eq!(harness.telemetry.sessions().active_count(), 0);

    assert_eq!(
        counter_with(&snapshot, telemetry::REQUESTS_TOTAL, &[("status_code", "500")]),
        1
    );
    assert_eq!(
        counter_with(
            &snapshot,
            telemetry::ERRORS_TOTAL,
            &[("error_kind", "Http"), ("component", "ai_model")]
        ),
        1
    );
    assert_eq!(
        counter_with(
            &snapshot,
            telemetry::AI_REQUESTS_TOTAL,
            &[("status", "error")]
        ),
        1
    );
}

// ============================================================================
// End conversation
// ============================================================================

#[tokio::test]
async fn end_conversation_requires_session_id() {
    let harness = harness(Some(REPLY), Some(CALM));

    let (status, body) = send(&harness.app, post_json("/api/end-conversation", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Session ID required");

    let (status, _) = send(
        &harness.app,
        post_json("/api/end-conversation", json!({ "session_id": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn end_conversation_with_satisfaction_completes_it() {
    let harness = harness(Some(REPLY), Some(CALM));

    let ((status, body), snapshot) = recorded(async {
        send(
            &harness.app,
            post_json("/api/mental-health", json!({ "prompt": "hi", "session_id": "s1" })),
        )
        .await;
        send(
            &harness.app,
            post_json(
                "/api/end-conversation",
                json!({ "session_id": "s1", "satisfaction_score": 4.5 }),
            ),
        )
        .await
    });

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Conversation ended successfully");
    assert_eq!(harness.telemetry.sessions().active_count(), 0);
    assert_eq!(
        counter_with(
            &snapshot,
            telemetry::CONVERSATIONS_TOTAL,
            &[("completion_status", "completed")]
        ),
        1
    );
    let satisfaction: Vec<f64> = snapshot
        .iter()
        .filter(|(key, _, _, _)| key.key().name() == telemetry::USER_SATISFACTION)
        .flat_map(|(_, _, _, value)| match value {
            DebugValue::Histogram(values) => values.iter().map(|v| v.0).collect(),
            _ => Vec::new(),
        })
        .collect();
    assert_eq!(satisfaction, [4.5]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn end_conversation_without_score_tracks_nothing() {
    let harness = harness(Some(REPLY), Some(CALM));

    let ((status, _), snapshot) = recorded(send(
        &harness.app,
        post_json("/api/end-conversation", json!({ "session_id": "never-seen" })),
    ));

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        counter_with(&snapshot, telemetry::CONVERSATIONS_TOTAL, &[]),
        0
    );
}

// ============================================================================
// Monitoring
// ============================================================================

#[tokio::test]
async fn health_reports_resources() {
    let harness = harness(Some(REPLY), Some(CALM));

    let (status, body) = send(&harness.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"]["name"], "test-service");
    assert_eq!(body["system"]["memory_usage_percent"], 40.0);
    assert_eq!(body["system"]["disk_usage_percent"], 55.0);
    assert_eq!(body["application"]["active_sessions"], 0);
    assert_eq!(body["application"]["tracing_exporter"], "disabled");
    assert_eq!(body["application"]["ai_service_status"], "unknown");
    assert_eq!(
        body["dependencies"],
        json!({ "ai_model": "unknown", "prometheus": "disabled", "opentelemetry": "disabled" })
    );
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn health_follows_the_latest_model_call() {
    let failing = harness(None, Some(CALM));
    send(
        &failing.app,
        post_json("/api/mental-health", json!({ "prompt": "hi", "session_id": "s1" })),
    )
    .await;
    let (_, body) = send(&failing.app, get("/health")).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["application"]["ai_service_status"], "failing");
    assert_eq!(body["dependencies"]["ai_model"], "failing");

    let working = harness(Some(REPLY), Some(CALM));
    send(
        &working.app,
        post_json("/api/mental-health", json!({ "prompt": "hi", "session_id": "s1" })),
    )
    .await;
    let (_, body) = send(&working.app, get("/health")).await;
    assert_eq!(body["application"]["ai_service_status"], "healthy");
}

#[tokio::test]
async fn health_warns_on_high_memory() {
    let sample = ResourceSample {
        memory_percent: 95.0,
        ..CALM
    };
    let harness = harness(Some(REPLY), Some(sample));

    let (_, body) = send(&harness.app, get("/health")).await;
    assert_eq!(body["status"], "warning");
}

#[tokio::test]
async fn health_is_degraded_when_sampling_fails() {
    let harness = harness(Some(REPLY), None);

    let (status, body) = send(&harness.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert!(body.get("system").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn metrics_endpoint_renders_prometheus_text() {
    let recorder = PrometheusExposition::build_recorder().unwrap();
    let exposition = PrometheusExposition::from_handle(recorder.handle());
    let telemetry = Arc::new(TelemetryContext::disabled("test-service"));
    let state = AppState::new(
        telemetry,
        Arc::new(ConversationStore::default()),
        Arc::new(MockGenerator { reply: Some(REPLY) }),
        Arc::new(FixedSampler(Some(CALM))),
    )
    .exposition(exposition);
    let app = router(state);

    let (content_type, body) = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                send(
                    &app,
                    post_json("/api/mental-health", json!({ "prompt": "hi", "session_id": "s1" })),
                )
                .await;

                let response = app.clone().oneshot(get("/metrics")).await.unwrap();
                let content_type = response.headers()[header::CONTENT_TYPE]
                    .to_str()
                    .unwrap()
                    .to_string();
                let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                    .await
                    .unwrap();
                (content_type, String::from_utf8(bytes.to_vec()).unwrap())
            })
        })
    });

    assert_eq!(
        content_type,
        companion::telemetry::exposition::CONTENT_TYPE
    );
    assert!(body.contains("companion_requests_total"));
    assert!(body.contains("companion_ai_latency_seconds_bucket"));
    assert!(body.contains(r#"resource_type="memory_percent""#));
}

#[tokio::test]
async fn metrics_endpoint_without_exposition_is_empty() {
    let harness = harness(Some(REPLY), Some(CALM));

    let response = harness.app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn custom_metrics_reports_sessions_and_exporter() {
    let harness = harness(Some(REPLY), Some(CALM));
    send(
        &harness.app,
        post_json("/api/mental-health", json!({ "prompt": "hi", "session_id": "a" })),
    )
    .await;

    let (status, body) = send(&harness.app, get("/metrics/custom")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "active_sessions": 1, "tracing_exporter": "disabled" }));
}

// ============================================================================
// Dashboard and debug
// ============================================================================

#[tokio::test]
async fn dashboard_summarises_service_and_monitoring_stack() {
    let harness = harness(Some(REPLY), Some(CALM));
    send(
        &harness.app,
        post_json("/api/mental-health", json!({ "prompt": "hi", "session_id": "a" })),
    )
    .await;

    let (status, body) = send(&harness.app, get("/stats/dashboard")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["timestamp"].is_string());
    assert_eq!(body["service_info"]["name"], "test-service");
    assert_eq!(body["service_info"]["environment"], "production");
    assert_eq!(body["current_metrics"]["active_sessions"], 1);
    assert!(body["current_metrics"]["uptime_seconds"].as_f64().unwrap() >= 0.0);
    assert_eq!(body["current_metrics"]["ai_service_status"], "healthy");
    assert_eq!(
        body["monitoring_stack"],
        json!({ "prometheus": "disabled", "opentelemetry": "disabled", "tracing_exporter": "disabled" })
    );
}

#[tokio::test]
async fn dashboard_reports_prometheus_when_exposed() {
    let recorder = PrometheusExposition::build_recorder().unwrap();
    let state = AppState::new(
        Arc::new(TelemetryContext::disabled("test-service")),
        Arc::new(ConversationStore::default()),
        Arc::new(MockGenerator { reply: Some(REPLY) }),
        Arc::new(FixedSampler(Some(CALM))),
    )
    .exposition(PrometheusExposition::from_handle(recorder.handle()));
    let app = router(state);

    let (_, body) = send(&app, get("/stats/dashboard")).await;
    assert_eq!(body["monitoring_stack"]["prometheus"], "enabled");

    let (_, body) = send(&app, get("/health")).await;
    assert_eq!(body["dependencies"]["prometheus"], "enabled");
}

#[tokio::test]
async fn debug_trace_without_tracing_has_no_trace_id() {
    let harness = harness(Some(REPLY), Some(CALM));

    let (status, body) = send(&harness.app, get("/debug/trace")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Trace generated", "trace_id": null }));
}

#[tokio::test]
async fn debug_trace_returns_the_span_trace_id() {
    let provider = TracerProvider::builder().build();
    let telemetry = TelemetryContext::builder("test-service")
        .tracer(ExporterKind::Console, provider.tracer("test"))
        .build();
    let state = AppState::new(
        Arc::new(telemetry),
        Arc::new(ConversationStore::default()),
        Arc::new(MockGenerator { reply: Some(REPLY) }),
        Arc::new(FixedSampler(Some(CALM))),
    );
    let app = router(state);

    let (status, body) = send(&app, get("/debug/trace")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Trace generated");
    let trace_id = body["trace_id"].as_str().unwrap();
    assert_eq!(trace_id.len(), 32);
    assert!(trace_id.chars().all(|c| c.is_ascii_hexdigit()));

    let (_, body) = send(&app, get("/stats/dashboard")).await;
    assert_eq!(body["monitoring_stack"]["opentelemetry"], "enabled");
    assert_eq!(body["monitoring_stack"]["tracing_exporter"], "console");
}

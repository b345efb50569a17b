//! Telemetry: metric names, span export, and the shared telemetry context.
//!
//! Centralised metric names for companion operations. Metrics go through the
//! `metrics` facade; the daemon installs a Prometheus recorder (see
//! [`PrometheusExposition`]). Without a recorder installed, all metric calls
//! are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `companion_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `method`, `endpoint`: inbound HTTP method and route
//! - `status_code`: HTTP status the request resolved to
//! - `user_agent`: caller user agent, truncated to [`LABEL_PREFIX_LEN`] chars
//! - `model_name`: generation model identifier
//! - `error_kind`, `severity`, `component`: error classification

pub mod context;
pub mod exporter;
pub mod exposition;
pub mod mirror;
pub mod registry;
pub mod span;
#[cfg(feature = "server")]
pub mod subscriber;

pub use context::{AiServiceStatus, TelemetryContext, TelemetryContextBuilder};
pub use exporter::{ExporterConfig, ExporterFactory, ExporterHandle, ExporterKind, ExporterSelector};
pub use exposition::PrometheusExposition;
pub use mirror::{MetricsMirror, OtelMirror};
pub use registry::MetricRegistry;
pub use span::SpanGuard;

/// Total inbound requests.
///
/// Labels: `method`, `endpoint`, `status_code`, `user_agent`.
pub const REQUESTS_TOTAL: &str = "companion_requests_total";

/// Inbound request duration in seconds.
///
/// Labels: `method`, `endpoint`.
pub const REQUEST_DURATION_SECONDS: &str = "companion_request_duration_seconds";

/// Total calls to the generation model.
///
/// Labels: `model_name`, `status` ("success" | "error").
pub const AI_REQUESTS_TOTAL: &str = "companion_ai_requests_total";

/// Generation model latency in seconds.
///
/// Labels: `model_name`.
pub const AI_LATENCY_SECONDS: &str = "companion_ai_latency_seconds";

/// Total tracked conversations.
///
/// Labels: `conversation_type`, `completion_status` ("ongoing" | "completed").
pub const CONVERSATIONS_TOTAL: &str = "companion_conversations_total";

/// Number of active user sessions.
pub const ACTIVE_SESSIONS: &str = "companion_active_sessions";

/// Response quality scores in `[0, 1]`.
///
/// Labels: `quality_dimension`.
pub const RESPONSE_QUALITY: &str = "companion_response_quality";

/// User satisfaction scores, rendered as a summary.
pub const USER_SATISFACTION: &str = "companion_user_satisfaction";

/// Total application errors.
///
/// Labels: `error_kind`, `severity`, `component` ("api" | "ai_model").
pub const ERRORS_TOTAL: &str = "companion_errors_total";

/// Host resource usage.
///
/// Labels: `resource_type` ("memory_percent" | "memory_available_gb" |
/// "cpu_percent" | "disk_percent").
pub const SYSTEM_RESOURCES: &str = "companion_system_resources";

/// Static application info, always 1.
///
/// Labels: `version`, `service`, `environment`.
pub const APP_INFO: &str = "companion_app_info";

/// Buckets for [`REQUEST_DURATION_SECONDS`].
pub const REQUEST_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Buckets for [`AI_LATENCY_SECONDS`].
pub const AI_LATENCY_BUCKETS: &[f64] = &[0.5, 1.0, 2.0, 5.0, 10.0, 30.0];

/// Buckets for [`RESPONSE_QUALITY`].
pub const RESPONSE_QUALITY_BUCKETS: &[f64] = &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

/// Maximum characters of a caller-supplied string used as a label value.
pub const LABEL_PREFIX_LEN: usize = 20;

/// Truncate a caller-supplied string to [`LABEL_PREFIX_LEN`] characters.
///
/// Counts characters, not bytes, so multi-byte input never splits a code point.
pub fn truncate_label(value: &str) -> String {
    value.chars().take(LABEL_PREFIX_LEN).collect()
}

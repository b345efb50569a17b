//! Typed metric emission with fixed label schemas.
//!
//! Every metric the service emits is written through [`MetricRegistry`], so
//! the label set of each metric is defined in exactly one place. Values that
//! originate from callers (user agents) are truncated before they become
//! label values.

use crate::resources::ResourceSample;

use super::{
    ACTIVE_SESSIONS, AI_LATENCY_SECONDS, AI_REQUESTS_TOTAL, APP_INFO, CONVERSATIONS_TOTAL,
    ERRORS_TOTAL, REQUEST_DURATION_SECONDS, REQUESTS_TOTAL, RESPONSE_QUALITY, SYSTEM_RESOURCES,
    USER_SATISFACTION, truncate_label,
};

/// Component label for failures inside the inbound request handler.
pub const COMPONENT_API: &str = "api";

/// Component label for failures of the generation model call.
pub const COMPONENT_AI_MODEL: &str = "ai_model";

/// Severity label used for all wrapped-operation failures.
pub const SEVERITY_HIGH: &str = "high";

/// Conversation type label.
pub const CONVERSATION_TYPE: &str = "mental_health_support";

/// Process-wide metric sink.
///
/// Stateless: all series live in whichever `metrics` recorder is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricRegistry;

impl MetricRegistry {
    /// Count an inbound request outcome.
    pub fn record_request(method: &str, endpoint: &str, status_code: u16, user_agent: &str) {
        metrics::counter!(REQUESTS_TOTAL,
            "method" => method.to_owned(),
            "endpoint" => endpoint.to_owned(),
            "status_code" => status_code.to_string(),
            "user_agent" => truncate_label(user_agent),
        )
        .increment(1);
    }

    /// Record inbound request duration.
    pub fn record_request_duration(method: &str, endpoint: &str, seconds: f64) {
        metrics::histogram!(REQUEST_DURATION_SECONDS,
            "method" => method.to_owned(),
            "endpoint" => endpoint.to_owned(),
        )
        .record(seconds);
    }

    /// Count an application error.
    pub fn record_error(error_kind: &str, severity: &'static str, component: &'static str) {
        metrics::counter!(ERRORS_TOTAL,
            "error_kind" => error_kind.to_owned(),
            "severity" => severity,
            "component" => component,
        )
        .increment(1);
    }

    /// Count a generation model call outcome.
    pub fn record_ai_request(model: &str, ok: bool) {
        let status = if ok { "success" } else { "error" };
        metrics::counter!(AI_REQUESTS_TOTAL,
            "model_name" => model.to_owned(),
            "status" => status,
        )
        .increment(1);
    }

    /// Record generation model latency.
    pub fn record_ai_latency(model: &str, seconds: f64) {
        metrics::histogram!(AI_LATENCY_SECONDS, "model_name" => model.to_owned()).record(seconds);
    }

    /// Record a response quality score for one dimension.
    pub fn record_quality(dimension: &'static str, score: f64) {
        metrics::histogram!(RESPONSE_QUALITY, "quality_dimension" => dimension).record(score);
    }

    /// Count a tracked conversation.
    pub fn record_conversation(completed: bool) {
        let completion_status = if completed { "completed" } else { "ongoing" };
        metrics::counter!(CONVERSATIONS_TOTAL,
            "conversation_type" => CONVERSATION_TYPE,
            "completion_status" => completion_status,
        )
        .increment(1);
    }

    /// Record a user satisfaction score.
    pub fn record_satisfaction(score: f64) {
        metrics::histogram!(USER_SATISFACTION).record(score);
    }

    /// Set the active session gauge to an absolute value.
    pub fn set_active_sessions(count: usize) {
        metrics::gauge!(ACTIVE_SESSIONS).set(count as f64);
    }

    /// Set a single host resource gauge.
    pub fn set_resource(resource_type: &'static str, value: f64) {
        metrics::gauge!(SYSTEM_RESOURCES, "resource_type" => resource_type).set(value);
    }

    /// Write every field of a resource sample into its gauge.
    pub fn record_resources(sample: &ResourceSample) {
        for (resource_type, value) in sample.gauges() {
            Self::set_resource(resource_type, value);
        }
    }

    /// Publish static application info as a constant-1 gauge.
    pub fn record_app_info(version: &str, service: &str, environment: &str) {
        metrics::gauge!(APP_INFO,
            "version" => version.to_owned(),
            "service" => service.to_owned(),
            "environment" => environment.to_owned(),
        )
        .set(1.0);
    }
}

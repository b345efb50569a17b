//! The process-wide telemetry context.
//!
//! [`TelemetryContext`] is built once at startup and shared (`Arc`) with every
//! component that emits spans or session/conversation metrics. It replaces
//! module-level globals: the only process-wide state left is the `metrics`
//! recorder, which the Prometheus exposition model requires.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::Tracer;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::exporter::{ExporterHandle, ExporterKind};
use super::mirror::{MetricsMirror, mirror_guarded};
use super::registry::MetricRegistry;
use super::span::SpanGuard;
use crate::session::SessionTracker;

/// Status of the generation model, judged by the most recent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiServiceStatus {
    /// No call has completed yet.
    Unknown,
    Healthy,
    Failing,
}

impl AiServiceStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AiServiceStatus::Healthy,
            2 => AiServiceStatus::Failing,
            _ => AiServiceStatus::Unknown,
        }
    }
}

/// Shared telemetry state: service identity, tracer, mirror, sessions.
pub struct TelemetryContext {
    service_name: String,
    service_version: String,
    environment: String,
    exporter: ExporterKind,
    tracer: Option<Tracer>,
    mirror: Option<Arc<dyn MetricsMirror>>,
    sessions: SessionTracker,
    ai_status: AtomicU8,
    started: Instant,
}

impl TelemetryContext {
    /// Start building a context for `service_name`.
    pub fn builder(service_name: impl Into<String>) -> TelemetryContextBuilder {
        TelemetryContextBuilder::new(service_name)
    }

    /// A context with tracing off and no mirror.
    pub fn disabled(service_name: impl Into<String>) -> Self {
        Self::builder(service_name).build()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The exporter spans are sent to.
    pub fn exporter(&self) -> ExporterKind {
        self.exporter
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracer.is_some()
    }

    /// Active session registry.
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Outcome of the most recent completed model call.
    pub fn ai_service_status(&self) -> AiServiceStatus {
        AiServiceStatus::from_u8(self.ai_status.load(Ordering::Relaxed))
    }

    /// Remember the outcome of a completed model call.
    pub fn record_ai_outcome(&self, ok: bool) {
        let status = if ok {
            AiServiceStatus::Healthy
        } else {
            AiServiceStatus::Failing
        };
        self.ai_status.store(status as u8, Ordering::Relaxed);
    }

    /// Time since the context was built.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Open a span; a no-op guard when tracing is disabled.
    pub fn start_span(&self, name: impl Into<String>, attributes: Vec<KeyValue>) -> SpanGuard {
        SpanGuard::start(self.tracer.as_ref(), name, attributes)
    }

    /// Run a call against the secondary metrics backend, if any, ignoring
    /// its failures.
    pub fn mirror(&self, call: impl FnOnce(&dyn MetricsMirror) -> crate::Result<()>) {
        mirror_guarded(self.mirror.as_deref(), call);
    }

    /// Publish the static application info series.
    pub fn record_app_info(&self) {
        MetricRegistry::record_app_info(&self.service_version, &self.service_name, &self.environment);
    }

    /// Record conversation-level metrics.
    ///
    /// `message_count` is supplied by the conversation store. A
    /// `satisfaction` score marks the conversation as completed.
    pub fn track_conversation(&self, session_id: &str, message_count: u64, satisfaction: Option<f64>) {
        let mut span = self.start_span(
            "conversation_tracking",
            vec![
                KeyValue::new("conversation.session_id", session_id.to_owned()),
                KeyValue::new("conversation.message_count", message_count as i64),
            ],
        );

        MetricRegistry::record_conversation(satisfaction.is_some());
        self.mirror(|m| m.conversation_length(session_id, message_count));

        if let Some(score) = satisfaction {
            MetricRegistry::record_satisfaction(score);
            span.set_attribute(KeyValue::new("conversation.satisfaction", score));
        }

        info!(
            session_id,
            message_count,
            satisfaction = ?satisfaction,
            "conversation tracked"
        );
        span.ok();
    }
}

impl std::fmt::Debug for TelemetryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryContext")
            .field("service_name", &self.service_name)
            .field("environment", &self.environment)
            .field("exporter", &self.exporter)
            .field("active_sessions", &self.sessions.active_count())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TelemetryContext`].
pub struct TelemetryContextBuilder {
    service_name: String,
    service_version: String,
    environment: String,
    exporter: ExporterKind,
    tracer: Option<Tracer>,
    mirror: Option<Arc<dyn MetricsMirror>>,
}

impl TelemetryContextBuilder {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: crate::PKG_VERSION.to_string(),
            environment: "production".to_string(),
            exporter: ExporterKind::Disabled,
            tracer: None,
            mirror: None,
        }
    }

    /// Take the tracer and exporter kind from a selected exporter.
    pub fn exporter(mut self, handle: &ExporterHandle) -> Self {
        self.exporter = handle.kind();
        self.tracer = handle.tracer().cloned();
        self
    }

    /// Use an explicit tracer.
    pub fn tracer(mut self, kind: ExporterKind, tracer: Tracer) -> Self {
        self.exporter = kind;
        self.tracer = Some(tracer);
        self
    }

    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Attach a secondary metrics backend.
    pub fn mirror(mut self, mirror: Arc<dyn MetricsMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn build(self) -> TelemetryContext {
        TelemetryContext {
            service_name: self.service_name,
            service_version: self.service_version,
            environment: self.environment,
            exporter: self.exporter,
            tracer: self.tracer,
            mirror: self.mirror,
            sessions: SessionTracker::new(),
            ai_status: AtomicU8::new(AiServiceStatus::Unknown as u8),
            started: Instant::now(),
        }
    }
}

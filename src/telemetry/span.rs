//! Span lifecycle guard.
//!
//! [`SpanGuard`] owns an optional OpenTelemetry span and guarantees it is
//! ended exactly once. When tracing is disabled the guard holds nothing and
//! every method is a no-op. A guard dropped before [`ok()`](SpanGuard::ok)
//! or [`error()`](SpanGuard::error) marks the span as cancelled.

use opentelemetry::KeyValue;
use opentelemetry::trace::{Span as _, Status, Tracer as _};
use opentelemetry_sdk::trace::{Span, Tracer};

/// Status message for spans whose owning future was dropped.
pub const CANCELLED: &str = "cancelled";

/// Owner of a single (possibly absent) span.
#[derive(Debug)]
pub struct SpanGuard {
    span: Option<Span>,
}

impl SpanGuard {
    /// Start a span on `tracer`, or a no-op guard when there is no tracer.
    pub fn start(tracer: Option<&Tracer>, name: impl Into<String>, attributes: Vec<KeyValue>) -> Self {
        let span = tracer.map(|tracer| {
            tracer
                .span_builder(name.into())
                .with_attributes(attributes)
                .start(tracer)
        });
        Self { span }
    }

    /// Whether a real span is being recorded.
    pub fn is_recording(&self) -> bool {
        self.span.as_ref().is_some_and(|span| span.is_recording())
    }

    /// Hex trace id of the span, if one is recording.
    pub fn trace_id(&self) -> Option<String> {
        self.span
            .as_ref()
            .map(|span| format!("{:032x}", span.span_context().trace_id()))
    }

    /// Attach an attribute.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(span) = self.span.as_mut() {
            span.set_attribute(attribute);
        }
    }

    /// Mark the span OK and end it.
    pub fn ok(mut self) {
        if let Some(mut span) = self.span.take() {
            span.set_status(Status::Ok);
            span.end();
        }
    }

    /// Record `err` on the span, mark it ERROR and end it.
    pub fn error(mut self, err: &dyn std::error::Error) {
        if let Some(mut span) = self.span.take() {
            span.record_error(err);
            span.set_status(Status::error(err.to_string()));
            span.end();
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if let Some(mut span) = self.span.take() {
            span.set_status(Status::error(CANCELLED));
            span.end();
        }
    }
}


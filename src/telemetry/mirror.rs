//! Optional secondary metrics backend.
//!
//! A [`MetricsMirror`] duplicates a few key measurements into a second
//! backend. Mirror calls are fallible, and callers discard their errors
//! through [`mirror_guarded`] so a broken secondary backend can never affect
//! the request path.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

use crate::Result;

/// Secondary sink for request, latency and conversation measurements.
pub trait MetricsMirror: Send + Sync {
    /// Mirror one inbound request outcome.
    fn request(&self, method: &str, endpoint: &str, ok: bool) -> Result<()>;

    /// Mirror one generation model latency.
    fn ai_latency(&self, model: &str, seconds: f64, ok: bool) -> Result<()>;

    /// Mirror a conversation length in messages.
    fn conversation_length(&self, session_id: &str, message_count: u64) -> Result<()>;
}

/// Run a mirror call, discarding any error it returns.
pub(crate) fn mirror_guarded(
    mirror: Option<&dyn MetricsMirror>,
    call: impl FnOnce(&dyn MetricsMirror) -> Result<()>,
) {
    if let Some(mirror) = mirror {
        if let Err(e) = call(mirror) {
            tracing::trace!(error = %e, "secondary metric emission failed");
        }
    }
}

/// Instrumentation scope of the mirror's meter.
pub const METER_NAME: &str = env!("CARGO_PKG_NAME");

/// Mirror backed by an OpenTelemetry meter.
///
/// Uses whatever meter provider is installed globally; with none installed
/// the instruments are no-ops. The service identity belongs on the
/// provider's resource, not on the meter.
pub struct OtelMirror {
    requests: Counter<u64>,
    ai_latency: Histogram<f64>,
    conversation_length: Histogram<u64>,
}

impl OtelMirror {
    /// Create instruments on the global meter.
    pub fn new() -> Self {
        Self::with_meter(&opentelemetry::global::meter(METER_NAME))
    }

    /// Create instruments on an explicit meter.
    pub fn with_meter(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("http_requests_total")
                .with_description("Total HTTP requests")
                .with_unit("1")
                .init(),
            ai_latency: meter
                .f64_histogram("ai_model_latency")
                .with_description("AI model response latency")
                .with_unit("s")
                .init(),
            conversation_length: meter
                .u64_histogram("conversation_length")
                .with_description("Length of conversations in messages")
                .with_unit("1")
                .init(),
        }
    }
}

impl MetricsMirror for OtelMirror {
    fn request(&self, method: &str, endpoint: &str, ok: bool) -> Result<()> {
        self.requests.add(
            1,
            &[
                KeyValue::new("method", method.to_owned()),
                KeyValue::new("status", if ok { "success" } else { "error" }),
                KeyValue::new("endpoint", endpoint.to_owned()),
            ],
        );
        Ok(())
    }

    fn ai_latency(&self, model: &str, seconds: f64, ok: bool) -> Result<()> {
        self.ai_latency.record(
            seconds,
            &[
                KeyValue::new("model_name", model.to_owned()),
                KeyValue::new("status", if ok { "success" } else { "error" }),
            ],
        );
        Ok(())
    }

    fn conversation_length(&self, session_id: &str, message_count: u64) -> Result<()> {
        self.conversation_length.record(
            message_count,
            &[
                KeyValue::new("session_id", session_id.to_owned()),
                KeyValue::new("conversation_type", super::registry::CONVERSATION_TYPE),
            ],
        );
        Ok(())
    }
}

impl Default for OtelMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OtelMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelMirror").finish_non_exhaustive()
    }
}

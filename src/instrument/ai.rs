//! Generation model call instrumentation.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{debug, error, warn};

use super::CANCELLED_KIND;
use crate::error::ErrorClass;
use crate::quality;
use crate::telemetry::registry::{COMPONENT_AI_MODEL, SEVERITY_HIGH};
use crate::telemetry::{MetricRegistry, SpanGuard, TelemetryContext};

/// Quality dimension recorded for each scored reply.
const OVERALL: &str = "overall";

/// Wraps calls to the generation model.
///
/// On success the reply is scored with [`quality::score`] and the score is
/// recorded alongside latency. The reply itself is returned untouched.
#[derive(Debug, Clone)]
pub struct AiRequestInstrumentor {
    telemetry: Arc<TelemetryContext>,
    model: String,
}

impl AiRequestInstrumentor {
    pub fn new(telemetry: Arc<TelemetryContext>, model: impl Into<String>) -> Self {
        Self {
            telemetry,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Await `call`, recording latency, outcome and reply quality.
    pub async fn run<T, E, Fut>(&self, call: Fut) -> Result<T, E>
    where
        T: AsRef<str>,
        E: std::error::Error + ErrorClass,
        Fut: Future<Output = Result<T, E>>,
    {
        let scope = AiScope::open(self);
        let result = call.await;
        match &result {
            Ok(reply) => scope.succeed(reply.as_ref()),
            Err(e) => scope.fail(e),
        }
        result
    }
}

struct AiScope<'a> {
    instrumentor: &'a AiRequestInstrumentor,
    start: Instant,
    span: Option<SpanGuard>,
}

impl<'a> AiScope<'a> {
    fn open(instrumentor: &'a AiRequestInstrumentor) -> Self {
        let span = instrumentor.telemetry.start_span(
            format!("ai_request_{}", instrumentor.model),
            vec![
                KeyValue::new("ai.model.name", instrumentor.model.clone()),
                KeyValue::new("ai.request.type", "text_generation"),
            ],
        );
        Self {
            instrumentor,
            start: Instant::now(),
            span: Some(span),
        }
    }

    fn succeed(mut self, reply: &str) {
        let Some(mut span) = self.span.take() else {
            return;
        };
        let model = self.instrumentor.model.as_str();
        let latency = self.start.elapsed().as_secs_f64();

        MetricRegistry::record_ai_request(model, true);
        MetricRegistry::record_ai_latency(model, latency);
        self.instrumentor.telemetry.record_ai_outcome(true);
        self.instrumentor
            .telemetry
            .mirror(|m| m.ai_latency(model, latency, true));

        let score = quality::score(reply);
        MetricRegistry::record_quality(OVERALL, score);

        span.set_attribute(KeyValue::new("ai.response.length", reply.chars().count() as i64));
        span.set_attribute(KeyValue::new("ai.response.quality", score));
        span.set_attribute(KeyValue::new("ai.latency", latency));

        debug!(model, latency_s = latency, quality = score, "model call completed");
        span.ok();
    }

    fn fail<E>(mut self, err: &E)
    where
        E: std::error::Error + ErrorClass,
    {
        let Some(span) = self.span.take() else {
            return;
        };
        let model = self.instrumentor.model.as_str();
        let latency = self.start.elapsed().as_secs_f64();

        MetricRegistry::record_ai_request(model, false);
        MetricRegistry::record_error(err.error_kind(), SEVERITY_HIGH, COMPONENT_AI_MODEL);
        self.instrumentor.telemetry.record_ai_outcome(false);
        self.instrumentor
            .telemetry
            .mirror(|m| m.ai_latency(model, latency, false));

        error!(model, error_kind = err.error_kind(), error = %err, "model call failed");
        span.error(err);
    }
}

impl Drop for AiScope<'_> {
    fn drop(&mut self) {
        let Some(span) = self.span.take() else {
            return;
        };
        let model = self.instrumentor.model.as_str();

        MetricRegistry::record_ai_request(model, false);
        MetricRegistry::record_error(CANCELLED_KIND, SEVERITY_HIGH, COMPONENT_AI_MODEL);

        warn!(model, "model call cancelled before completion");
        drop(span);
    }
}

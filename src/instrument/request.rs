//! Inbound request instrumentation.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{error, info, warn};

use super::CANCELLED_KIND;
use crate::error::ErrorClass;
use crate::telemetry::registry::{COMPONENT_API, SEVERITY_HIGH};
use crate::telemetry::{MetricRegistry, SpanGuard, TelemetryContext, truncate_label};

/// User agent label used when the caller sends none.
const UNKNOWN_CALLER: &str = "unknown";

/// `status_code` label of every failed or cancelled request.
const FAILURE_STATUS: u16 = 500;

/// Request-side hooks the instrumentor reads before invoking the handler.
pub trait InstrumentedRequest {
    /// Textual payload whose length is attached to the span.
    fn payload(&self) -> Option<&str> {
        None
    }

    /// Caller-identifying header (user agent).
    fn caller(&self) -> Option<&str> {
        None
    }
}

/// Response-side hook the instrumentor reads after a successful call.
pub trait InstrumentedResponse {
    /// Length of the textual response, in characters.
    fn response_length(&self) -> usize {
        0
    }
}

impl InstrumentedRequest for () {}

impl InstrumentedResponse for () {}

impl InstrumentedResponse for String {
    fn response_length(&self) -> usize {
        self.chars().count()
    }
}

/// Wraps inbound request handlers with metrics and a span.
///
/// ```rust,ignore
/// let instrumentor = RequestInstrumentor::new(telemetry, "mental_health", "POST", "/api/mental-health");
/// let reply = instrumentor.run(request, |req| handle(req)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct RequestInstrumentor {
    telemetry: Arc<TelemetryContext>,
    operation: String,
    method: String,
    endpoint: String,
}

impl RequestInstrumentor {
    pub fn new(
        telemetry: Arc<TelemetryContext>,
        operation: impl Into<String>,
        method: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            telemetry,
            operation: operation.into(),
            method: method.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Invoke `op` with `input`, recording the outcome.
    ///
    /// The handler's output or error is returned unchanged.
    pub async fn run<I, O, E, F, Fut>(&self, input: I, op: F) -> Result<O, E>
    where
        I: InstrumentedRequest,
        O: InstrumentedResponse,
        E: std::error::Error + ErrorClass,
        F: FnOnce(I) -> Fut,
        Fut: Future<Output = Result<O, E>>,
    {
        let scope = RequestScope::open(self, &input);
        let result = op(input).await;
        match &result {
            Ok(output) => scope.succeed(output.response_length()),
            Err(e) => scope.fail(e),
        }
        result
    }

    /// Bind `op` to this instrumentor, producing a reusable handler.
    pub fn wrap<F>(self, op: F) -> InstrumentedHandler<F> {
        InstrumentedHandler {
            instrumentor: self,
            op,
        }
    }
}

/// A handler bound to its instrumentor.
pub struct InstrumentedHandler<F> {
    instrumentor: RequestInstrumentor,
    op: F,
}

impl<F> InstrumentedHandler<F> {
    /// Invoke the wrapped handler.
    pub async fn call<I, O, E, Fut>(&self, input: I) -> Result<O, E>
    where
        I: InstrumentedRequest,
        O: InstrumentedResponse,
        E: std::error::Error + ErrorClass,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<O, E>>,
    {
        self.instrumentor.run(input, &self.op).await
    }

    pub fn instrumentor(&self) -> &RequestInstrumentor {
        &self.instrumentor
    }
}

/// One in-flight request. Finishing consumes the span; a scope dropped with
/// its span still present was cancelled.
struct RequestScope<'a> {
    instrumentor: &'a RequestInstrumentor,
    start: Instant,
    user_agent: String,
    input_length: usize,
    span: Option<SpanGuard>,
}

impl<'a> RequestScope<'a> {
    fn open(instrumentor: &'a RequestInstrumentor, input: &impl InstrumentedRequest) -> Self {
        let start = Instant::now();
        let telemetry = &instrumentor.telemetry;
        let mut span = telemetry.start_span(
            instrumentor.operation.clone(),
            vec![
                KeyValue::new("service.name", telemetry.service_name().to_owned()),
                KeyValue::new("operation.name", instrumentor.operation.clone()),
            ],
        );

        let input_length = input.payload().map_or(0, |p| p.chars().count());
        if input.payload().is_some() {
            span.set_attribute(KeyValue::new("request.input_length", input_length as i64));
        }

        let user_agent = match input.caller() {
            Some(caller) => {
                let truncated = truncate_label(caller);
                span.set_attribute(KeyValue::new("http.user_agent", truncated.clone()));
                truncated
            }
            None => UNKNOWN_CALLER.to_string(),
        };

        Self {
            instrumentor,
            start,
            user_agent,
            input_length,
            span: Some(span),
        }
    }

    fn succeed(mut self, response_length: usize) {
        let Some(mut span) = self.span.take() else {
            return;
        };
        let i = self.instrumentor;
        let duration = self.start.elapsed().as_secs_f64();

        MetricRegistry::record_request(&i.method, &i.endpoint, 200, &self.user_agent);
        MetricRegistry::record_request_duration(&i.method, &i.endpoint, duration);
        i.telemetry.mirror(|m| m.request(&i.method, &i.endpoint, true));

        span.set_attribute(KeyValue::new("http.status_code", 200_i64));
        span.set_attribute(KeyValue::new("response.length", response_length as i64));
        span.set_attribute(KeyValue::new("request.duration", duration));

        info!(
            operation = %i.operation,
            duration_s = duration,
            input_length = self.input_length,
            response_length,
            trace_id = span.trace_id().as_deref().unwrap_or("-"),
            "request completed"
        );
        span.ok();
    }

    fn fail<E>(mut self, err: &E)
    where
        E: std::error::Error + ErrorClass,
    {
        let Some(mut span) = self.span.take() else {
            return;
        };
        let i = self.instrumentor;
        let kind = err.error_kind();

        MetricRegistry::record_error(kind, SEVERITY_HIGH, COMPONENT_API);
        // Every failure counts as 500; `status_code()` only shapes the response.
        MetricRegistry::record_request(&i.method, &i.endpoint, FAILURE_STATUS, &self.user_agent);
        i.telemetry.mirror(|m| m.request(&i.method, &i.endpoint, false));

        span.set_attribute(KeyValue::new("error.type", kind.to_owned()));
        error!(
            operation = %i.operation,
            error_kind = kind,
            error = %err,
            duration_s = self.start.elapsed().as_secs_f64(),
            "request failed"
        );
        span.error(err);
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        let Some(mut span) = self.span.take() else {
            return;
        };
        let i = self.instrumentor;

        MetricRegistry::record_error(CANCELLED_KIND, SEVERITY_HIGH, COMPONENT_API);
        MetricRegistry::record_request(&i.method, &i.endpoint, FAILURE_STATUS, &self.user_agent);
        i.telemetry.mirror(|m| m.request(&i.method, &i.endpoint, false));

        span.set_attribute(KeyValue::new("error.type", CANCELLED_KIND));
        warn!(operation = %i.operation, "request cancelled before completion");
        // Dropping the guard closes the span as cancelled.
        drop(span);
    }
}

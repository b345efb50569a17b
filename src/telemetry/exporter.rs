//! Span exporter selection with fallback.
//!
//! The selector walks an ordered preference list of exporter kinds and adopts
//! the first one that constructs. Construction failures never escape: if
//! every candidate fails, a console exporter (which cannot fail) is used.
//!
//! # Selection Flow
//!
//! ```text
//! config.disabled? ──yes──► ExporterHandle::disabled()  (all spans no-op)
//!        │ no
//!        ▼
//!   otlp-grpc ──fail──► otlp-http ──fail──► ... ──all failed──► console
//!        │ ok               │ ok
//!        ▼                  ▼
//!     adopted            adopted
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{Config as TraceConfig, Tracer, TracerProvider};
use tracing::{info, warn};

use crate::{CompanionError, Result};

/// Export timeout for the network exporters.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Span exporter destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterKind {
    /// Tracing turned off; spans are never created.
    Disabled,
    /// OTLP over gRPC (primary).
    OtlpGrpc,
    /// OTLP over HTTP/protobuf (secondary).
    OtlpHttp,
    /// Spans printed to stdout (local fallback).
    Console,
}

impl ExporterKind {
    /// Stable name, matching the configuration spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExporterKind::Disabled => "disabled",
            ExporterKind::OtlpGrpc => "otlp-grpc",
            ExporterKind::OtlpHttp => "otlp-http",
            ExporterKind::Console => "console",
        }
    }
}

impl fmt::Display for ExporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExporterKind {
    type Err = CompanionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" => Ok(ExporterKind::Disabled),
            "otlp-grpc" | "otlp" | "grpc" => Ok(ExporterKind::OtlpGrpc),
            "otlp-http" | "http" => Ok(ExporterKind::OtlpHttp),
            "console" | "stdout" => Ok(ExporterKind::Console),
            other => Err(CompanionError::Configuration(format!(
                "unknown trace exporter '{other}'"
            ))),
        }
    }
}

/// Parse a comma-separated preference list such as `"otlp-grpc,console"`.
///
/// See [`resolve_preference`] for how unknown names are handled.
pub fn parse_preference(list: &str) -> Vec<ExporterKind> {
    resolve_preference(list.split(','))
}

/// Resolve exporter names into a preference list.
///
/// Unknown names are logged and skipped so a typo never prevents startup.
/// If nothing usable remains the selector falls back to console.
pub fn resolve_preference<I, S>(names: I) -> Vec<ExporterKind>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter(|name| !name.as_ref().trim().is_empty())
        .filter_map(|name| match name.as_ref().parse() {
            Ok(kind) => Some(kind),
            Err(e) => {
                warn!(error = %e, "ignoring trace exporter preference");
                None
            }
        })
        .collect()
}

/// Inputs for exporter selection.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Turn tracing off entirely.
    pub disabled: bool,
    /// Candidates, most preferred first.
    pub preference: Vec<ExporterKind>,
    /// Collector host used when no explicit endpoint is set.
    pub host: String,
    /// OTLP/gRPC port (default: 4317).
    pub grpc_port: u16,
    /// OTLP/HTTP port (default: 4318).
    pub http_port: u16,
    /// Explicit collector endpoint; overrides host and port.
    pub endpoint: Option<String>,
    /// `service.name` resource attribute.
    pub service_name: String,
    /// `service.version` resource attribute.
    pub service_version: String,
    /// `deployment.environment` resource attribute.
    pub environment: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            preference: vec![
                ExporterKind::OtlpGrpc,
                ExporterKind::OtlpHttp,
                ExporterKind::Console,
            ],
            host: "localhost".to_string(),
            grpc_port: 4317,
            http_port: 4318,
            endpoint: None,
            service_name: crate::DEFAULT_SERVICE_NAME.to_string(),
            service_version: crate::PKG_VERSION.to_string(),
            environment: "production".to_string(),
        }
    }
}

impl ExporterConfig {
    /// Collector endpoint for a network exporter kind.
    pub fn endpoint_for(&self, kind: ExporterKind) -> Option<String> {
        let port = match kind {
            ExporterKind::OtlpGrpc => self.grpc_port,
            ExporterKind::OtlpHttp => self.http_port,
            ExporterKind::Disabled | ExporterKind::Console => return None,
        };
        Some(
            self.endpoint
                .clone()
                .unwrap_or_else(|| format!("http://{}:{port}", self.host)),
        )
    }

    /// Resource attributes describing this service instance.
    pub fn resource(&self) -> Resource {
        Resource::new(vec![
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("service.version", self.service_version.clone()),
            KeyValue::new(
                "service.instance.id",
                format!("{}-{}", self.service_name, uuid::Uuid::new_v4().simple()),
            ),
            KeyValue::new("deployment.environment", self.environment.clone()),
        ])
    }
}

/// Builds a tracer provider for one exporter kind.
///
/// Implementations report construction problems as errors; the selector
/// treats any error as "try the next candidate".
pub trait ExporterFactory: Send + Sync {
    fn build(
        &self,
        kind: ExporterKind,
        config: &ExporterConfig,
        resource: Resource,
    ) -> Result<TracerProvider>;
}

/// Factory for the real OTLP and console exporters.
///
/// The OTLP exporters batch on the Tokio runtime, so building them requires
/// a Tokio runtime context.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtelExporterFactory;

impl ExporterFactory for OtelExporterFactory {
    fn build(
        &self,
        kind: ExporterKind,
        config: &ExporterConfig,
        resource: Resource,
    ) -> Result<TracerProvider> {
        match kind {
            ExporterKind::OtlpGrpc => {
                let endpoint = config.endpoint_for(kind).unwrap_or_default();
                let exporter = opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint)
                    .with_timeout(EXPORT_TIMEOUT)
                    .build_span_exporter()
                    .map_err(|e| CompanionError::Exporter(format!("otlp-grpc: {e}")))?;
                Ok(TracerProvider::builder()
                    .with_config(TraceConfig::default().with_resource(resource))
                    .with_batch_exporter(exporter, runtime::Tokio)
                    .build())
            }
            ExporterKind::OtlpHttp => {
                let endpoint = config.endpoint_for(kind).unwrap_or_default();
                let endpoint = if endpoint.ends_with("/v1/traces") {
                    endpoint
                } else {
                    format!("{}/v1/traces", endpoint.trim_end_matches('/'))
                };
                let exporter = opentelemetry_otlp::new_exporter()
                    .http()
                    .with_endpoint(endpoint)
                    .with_timeout(EXPORT_TIMEOUT)
                    .build_span_exporter()
                    .map_err(|e| CompanionError::Exporter(format!("otlp-http: {e}")))?;
                Ok(TracerProvider::builder()
                    .with_config(TraceConfig::default().with_resource(resource))
                    .with_batch_exporter(exporter, runtime::Tokio)
                    .build())
            }
            ExporterKind::Console => Ok(console_provider(resource)),
            ExporterKind::Disabled => Err(CompanionError::Exporter(
                "disabled is not a span exporter".to_string(),
            )),
        }
    }
}

/// Console tracer provider. Infallible.
fn console_provider(resource: Resource) -> TracerProvider {
    TracerProvider::builder()
        .with_config(TraceConfig::default().with_resource(resource))
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build()
}

/// The adopted exporter and its tracer.
///
/// Fixed for the lifetime of the process.
pub struct ExporterHandle {
    kind: ExporterKind,
    provider: Option<TracerProvider>,
    tracer: Option<Tracer>,
}

impl ExporterHandle {
    /// Wrap an already-built provider.
    pub fn new(kind: ExporterKind, provider: TracerProvider, service_name: &str) -> Self {
        let tracer = provider.tracer(service_name.to_owned());
        Self {
            kind,
            provider: Some(provider),
            tracer: Some(tracer),
        }
    }

    /// A handle with tracing turned off.
    pub fn disabled() -> Self {
        Self {
            kind: ExporterKind::Disabled,
            provider: None,
            tracer: None,
        }
    }

    pub fn kind(&self) -> ExporterKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.tracer.is_some()
    }

    pub fn tracer(&self) -> Option<&Tracer> {
        self.tracer.as_ref()
    }

    /// Flush pending spans and shut the provider's processors down.
    ///
    /// Tracers cloned from this handle stay valid but stop exporting.
    pub fn shutdown(&mut self) {
        self.tracer = None;
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                warn!(exporter = %self.kind, error = %e, "failed to shut down trace exporter");
            }
        }
    }
}

impl fmt::Debug for ExporterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterHandle")
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Chooses the span exporter at startup.
pub struct ExporterSelector<F = OtelExporterFactory> {
    factory: F,
}

impl ExporterSelector {
    /// Selector using the real exporters.
    pub fn new() -> Self {
        Self {
            factory: OtelExporterFactory,
        }
    }
}

impl Default for ExporterSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ExporterFactory> ExporterSelector<F> {
    /// Selector using a custom factory.
    pub fn with_factory(factory: F) -> Self {
        Self { factory }
    }

    /// Resolve the exporter for `config`. Never fails.
    pub fn select(&self, config: &ExporterConfig) -> ExporterHandle {
        if config.disabled {
            info!("tracing disabled by configuration");
            return ExporterHandle::disabled();
        }

        for &kind in &config.preference {
            if kind == ExporterKind::Disabled {
                continue;
            }
            match self.factory.build(kind, config, config.resource()) {
                Ok(provider) => {
                    info!(
                        exporter = %kind,
                        endpoint = config.endpoint_for(kind).as_deref().unwrap_or("-"),
                        service = %config.service_name,
                        "trace exporter configured"
                    );
                    return ExporterHandle::new(kind, provider, &config.service_name);
                }
                Err(e) => {
                    warn!(exporter = %kind, error = %e, "trace exporter unavailable, trying next");
                }
            }
        }

        warn!("no preferred trace exporter available, falling back to console");
        ExporterHandle::new(
            ExporterKind::Console,
            console_provider(config.resource()),
            &config.service_name,
        )
    }
}

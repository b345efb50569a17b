//! Log subscriber setup for the daemon.
//!
//! Filter comes from `RUST_LOG` (default `info`). When a span exporter is
//! active, `tracing` spans are forwarded to the same tracer.

use opentelemetry_sdk::trace::Tracer;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::{CompanionError, Result};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// A log-only subscriber for use before the exporter is known.
///
/// Meant for `tracing::subscriber::with_default` around exporter selection.
pub fn bootstrap() -> impl Subscriber + Send + Sync {
    tracing_subscriber::registry().with(filter()).with(fmt::layer())
}

/// Install the global subscriber.
pub fn init(tracer: Option<Tracer>) -> Result<()> {
    let otel = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer())
        .with(otel)
        .try_init()
        .map_err(|e| CompanionError::Configuration(format!("failed to install log subscriber: {e}")))
}

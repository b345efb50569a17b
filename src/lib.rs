//! Companion - instrumented conversational companion service
//!
//! This crate wraps a text-generation model behind a small chat API and
//! instruments every inbound request and every model call with Prometheus
//! metrics and OpenTelemetry spans. Tracing degrades gracefully: the span
//! exporter is chosen at startup from an ordered preference list, falling
//! back to console output when no collector is reachable.
//!
//! # Instrumenting a model call
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use companion::instrument::AiRequestInstrumentor;
//! use companion::telemetry::{ExporterConfig, ExporterSelector, TelemetryContext};
//!
//! # async fn generate(_: &str) -> companion::Result<String> { Ok(String::new()) }
//! #[tokio::main]
//! async fn main() -> companion::Result<()> {
//!     let exporter = ExporterSelector::new().select(&ExporterConfig::default());
//!     let telemetry = Arc::new(
//!         TelemetryContext::builder("my-service")
//!             .exporter(&exporter)
//!             .build(),
//!     );
//!
//!     let ai = AiRequestInstrumentor::new(telemetry, "my-model");
//!     let reply = ai.run(generate("Hello")).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`telemetry`]: metric names, exporter selection, spans, exposition
//! - [`instrument`]: request and model-call wrappers
//! - [`quality`]: heuristic response scoring
//! - [`session`]: active session tracking
//! - [`resources`], [`refresher`]: host resource sampling and refresh
//! - [`conversation`], [`generator`]: chat history and the model seam
//! - `server`: HTTP routes and daemon configuration (feature `server`)

pub mod conversation;
pub mod error;
pub mod generator;
pub mod health;
pub mod instrument;
pub mod quality;
pub mod refresher;
pub mod resources;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod telemetry;

// Re-export main types at crate root
pub use error::{CompanionError, ErrorClass, Result};
pub use generator::{HttpGenerator, TextGenerator};
pub use instrument::{AiRequestInstrumentor, RequestInstrumentor};
pub use session::SessionTracker;
pub use telemetry::{MetricRegistry, TelemetryContext};

/// Crate version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name used when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "mental-health-companion";

//! Instrumentation wrappers for inbound requests and model calls.
//!
//! Both wrappers take the operation to instrument as a value and return its
//! result unchanged. They observe failures (count them, mark the span) but
//! never convert or swallow them.
//!
//! # Exit paths
//!
//! ```text
//!            ┌──── Ok ────► success metrics, span OK, close
//! run(op) ───┼──── Err ───► error metrics, span ERROR, close, return Err
//!            └── dropped ─► error metrics (Cancelled), span ERROR, close
//! ```
//!
//! Each path emits its metrics and closes its span exactly once.

pub mod ai;
pub mod request;

pub use ai::AiRequestInstrumentor;
pub use request::{InstrumentedHandler, InstrumentedRequest, InstrumentedResponse, RequestInstrumentor};

/// Error kind recorded when a wrapped future is dropped before completing.
pub const CANCELLED_KIND: &str = "Cancelled";

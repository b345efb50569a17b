//! Prometheus text exposition.
//!
//! Builds a `metrics-exporter-prometheus` recorder with fixed buckets for the
//! service histograms. Histograms without configured buckets (user
//! satisfaction) are rendered as summaries.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use super::{
    AI_LATENCY_BUCKETS, AI_LATENCY_SECONDS, REQUEST_DURATION_BUCKETS, REQUEST_DURATION_SECONDS,
    RESPONSE_QUALITY, RESPONSE_QUALITY_BUCKETS,
};
use crate::{CompanionError, Result};

/// Content type of the Prometheus text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handle to the installed Prometheus recorder.
#[derive(Clone)]
pub struct PrometheusExposition {
    handle: PrometheusHandle,
}

impl PrometheusExposition {
    /// Build a recorder with the service bucket layout, without installing it.
    ///
    /// Useful with `metrics::with_local_recorder` in tests.
    pub fn build_recorder() -> Result<PrometheusRecorder> {
        Ok(Self::builder()?.build_recorder())
    }

    /// Build and install the recorder process-wide.
    ///
    /// Fails if a global recorder is already installed.
    pub fn install() -> Result<Self> {
        let handle = Self::builder()?.install_recorder().map_err(|e| {
            CompanionError::Configuration(format!("failed to install metrics recorder: {e}"))
        })?;
        Ok(Self { handle })
    }

    /// Wrap an existing recorder handle.
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Render all registered series in the text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    fn builder() -> Result<PrometheusBuilder> {
        let bucket_error =
            |e| CompanionError::Configuration(format!("invalid histogram buckets: {e}"));
        PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
                REQUEST_DURATION_BUCKETS,
            )
            .map_err(bucket_error)?
            .set_buckets_for_metric(
                Matcher::Full(AI_LATENCY_SECONDS.to_string()),
                AI_LATENCY_BUCKETS,
            )
            .map_err(bucket_error)?
            .set_buckets_for_metric(
                Matcher::Full(RESPONSE_QUALITY.to_string()),
                RESPONSE_QUALITY_BUCKETS,
            )
            .map_err(bucket_error)
    }
}

impl std::fmt::Debug for PrometheusExposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusExposition").finish_non_exhaustive()
    }
}

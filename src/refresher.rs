//! Periodic host resource refresh.
//!
//! [`BackgroundRefresher`] samples host resources on a fixed interval and
//! writes them into the resource gauges. A failed sample is logged and
//! retried after a longer backoff; only the shutdown token ends the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::resources::ResourceSampler;
use crate::telemetry::MetricRegistry;

/// Delay between successful samples (default: 30s).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Delay after a failed sample (default: 60s).
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Long-lived resource gauge refresher.
pub struct BackgroundRefresher {
    sampler: Arc<dyn ResourceSampler>,
    interval: Duration,
    backoff: Duration,
}

impl BackgroundRefresher {
    pub fn new(sampler: Arc<dyn ResourceSampler>) -> Self {
        Self {
            sampler,
            interval: DEFAULT_REFRESH_INTERVAL,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Set the delay between successful samples.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the delay after a failed sample.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run the loop on a new task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(
            interval_s = self.interval.as_secs(),
            backoff_s = self.backoff.as_secs(),
            "background resource refresher started"
        );
        tokio::spawn(self.run(shutdown))
    }

    /// Sample until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            let delay = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.sampler.sample() => match result {
                    Ok(sample) => {
                        MetricRegistry::record_resources(&sample);
                        debug!(?sample, "resource gauges refreshed");
                        self.interval
                    }
                    Err(e) => {
                        error!(error = %e, retry_in_s = self.backoff.as_secs(), "failed to update system metrics");
                        self.backoff
                    }
                },
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("background resource refresher stopped");
    }
}

//! Health report and dashboard assembly.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resources::ResourceSample;
use crate::telemetry::{AiServiceStatus, TelemetryContext};

/// Memory or CPU usage above this percentage downgrades status to warning.
pub const WARNING_THRESHOLD_PERCENT: f64 = 90.0;

/// Overall service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    /// Host resources could not be sampled.
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub uptime_seconds: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemInfo {
    pub memory_usage_percent: f64,
    pub memory_available_gb: f64,
    pub cpu_usage_percent: f64,
    pub disk_usage_percent: f64,
}

impl From<&ResourceSample> for SystemInfo {
    fn from(sample: &ResourceSample) -> Self {
        Self {
            memory_usage_percent: round2(sample.memory_percent),
            memory_available_gb: round2(sample.memory_available_gb),
            cpu_usage_percent: round2(sample.cpu_percent),
            disk_usage_percent: round2(sample.disk_percent),
        }
    }
}

/// Whether an optional monitoring backend is wired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Enabled,
    Disabled,
}

impl From<bool> for Availability {
    fn from(enabled: bool) -> Self {
        if enabled {
            Availability::Enabled
        } else {
            Availability::Disabled
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationInfo {
    pub active_sessions: usize,
    pub tracing_exporter: String,
    pub ai_service_status: AiServiceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dependencies {
    pub ai_model: AiServiceStatus,
    pub prometheus: Availability,
    pub opentelemetry: Availability,
}

/// Structured health document served by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub service: ServiceInfo,
    /// Absent when sampling failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemInfo>,
    pub application: ApplicationInfo,
    pub dependencies: Dependencies,
}

impl HealthReport {
    /// Build a report from the telemetry context and a resource sample.
    ///
    /// `metrics_enabled` says whether a Prometheus exposition is served.
    /// The model status is informational and never changes `status`.
    pub fn evaluate(
        telemetry: &TelemetryContext,
        sample: Option<&ResourceSample>,
        metrics_enabled: bool,
    ) -> Self {
        let ai_status = telemetry.ai_service_status();
        Self {
            status: status_for(sample),
            timestamp: Utc::now(),
            service: ServiceInfo {
                name: telemetry.service_name().to_owned(),
                version: telemetry.service_version().to_owned(),
                uptime_seconds: telemetry.uptime().as_secs_f64(),
            },
            system: sample.map(SystemInfo::from),
            application: ApplicationInfo {
                active_sessions: telemetry.sessions().active_count(),
                tracing_exporter: telemetry.exporter().to_string(),
                ai_service_status: ai_status,
            },
            dependencies: Dependencies {
                ai_model: ai_status,
                prometheus: metrics_enabled.into(),
                opentelemetry: telemetry.tracing_enabled().into(),
            },
        }
    }
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DashboardService {
    pub name: String,
    pub version: String,
    pub environment: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardMetrics {
    pub active_sessions: usize,
    pub uptime_seconds: f64,
    pub ai_service_status: AiServiceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStack {
    pub prometheus: Availability,
    pub opentelemetry: Availability,
    pub tracing_exporter: String,
}

/// Summary served by `GET /stats/dashboard`.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub timestamp: DateTime<Utc>,
    pub service_info: DashboardService,
    pub current_metrics: DashboardMetrics,
    pub monitoring_stack: MonitoringStack,
}

impl DashboardStats {
    pub fn collect(telemetry: &TelemetryContext, metrics_enabled: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            service_info: DashboardService {
                name: telemetry.service_name().to_owned(),
                version: telemetry.service_version().to_owned(),
                environment: telemetry.environment().to_owned(),
            },
            current_metrics: DashboardMetrics {
                active_sessions: telemetry.sessions().active_count(),
                uptime_seconds: telemetry.uptime().as_secs_f64(),
                ai_service_status: telemetry.ai_service_status(),
            },
            monitoring_stack: MonitoringStack {
                prometheus: metrics_enabled.into(),
                opentelemetry: telemetry.tracing_enabled().into(),
                tracing_exporter: telemetry.exporter().to_string(),
            },
        }
    }
}

/// Status implied by a resource sample.
pub fn status_for(sample: Option<&ResourceSample>) -> HealthStatus {
    match sample {
        None => HealthStatus::Degraded,
        Some(s)
            if s.memory_percent > WARNING_THRESHOLD_PERCENT
                || s.cpu_percent > WARNING_THRESHOLD_PERCENT =>
        {
            HealthStatus::Warning
        }
        Some(_) => HealthStatus::Healthy,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

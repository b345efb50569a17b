//! Host resource sampling.
//!
//! [`ResourceSampler`] is the seam between the service and the operating
//! system. [`ProcfsSampler`] reads Linux procfs and `statvfs`; tests and
//! other platforms supply their own implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::{CompanionError, Result};

/// One reading of host memory, CPU and disk usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSample {
    pub memory_percent: f64,
    pub memory_available_gb: f64,
    pub cpu_percent: f64,
    pub disk_percent: f64,
}

impl ResourceSample {
    /// `(resource_type, value)` pairs, as written to the resource gauge.
    pub fn gauges(&self) -> [(&'static str, f64); 4] {
        [
            ("memory_percent", self.memory_percent),
            ("memory_available_gb", self.memory_available_gb),
            ("cpu_percent", self.cpu_percent),
            ("disk_percent", self.disk_percent),
        ]
    }
}

/// Source of host resource readings.
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn sample(&self) -> Result<ResourceSample>;
}

/// Default CPU measurement window.
pub const DEFAULT_CPU_WINDOW: Duration = Duration::from_secs(1);

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Sampler backed by `/proc/meminfo`, `/proc/stat` and `statvfs`.
///
/// CPU usage is measured over `cpu_window` between two `/proc/stat` reads.
#[derive(Debug, Clone)]
pub struct ProcfsSampler {
    cpu_window: Duration,
    disk_path: String,
}

impl Default for ProcfsSampler {
    fn default() -> Self {
        Self {
            cpu_window: DEFAULT_CPU_WINDOW,
            disk_path: "/".to_string(),
        }
    }
}

impl ProcfsSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the CPU measurement window.
    pub fn cpu_window(mut self, window: Duration) -> Self {
        self.cpu_window = window;
        self
    }

    /// Set the filesystem whose usage is reported (default: `/`).
    pub fn disk_path(mut self, path: impl Into<String>) -> Self {
        self.disk_path = path.into();
        self
    }
}

#[async_trait]
impl ResourceSampler for ProcfsSampler {
    async fn sample(&self) -> Result<ResourceSample> {
        let (total, available) = parse_meminfo(&read_proc("/proc/meminfo").await?)?;

        let before = parse_cpu_times(&read_proc("/proc/stat").await?)?;
        tokio::time::sleep(self.cpu_window).await;
        let after = parse_cpu_times(&read_proc("/proc/stat").await?)?;

        let disk_percent = disk_usage_percent(&self.disk_path)?;

        Ok(ResourceSample {
            memory_percent: percent(total.saturating_sub(available), total),
            memory_available_gb: available as f64 / BYTES_PER_GB,
            cpu_percent: after.busy_percent_since(&before),
            disk_percent,
        })
    }
}

async fn read_proc(path: &'static str) -> Result<String> {
    tokio::task::spawn_blocking(move || std::fs::read_to_string(path))
        .await
        .map_err(|e| CompanionError::Sampling(format!("reading {path}: {e}")))?
        .map_err(|e| CompanionError::Sampling(format!("reading {path}: {e}")))
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Parse `MemTotal` and `MemAvailable` from `/proc/meminfo`, in bytes.
fn parse_meminfo(content: &str) -> Result<(u64, u64)> {
    let field = |name: &str| -> Option<u64> {
        content.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            let kb = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            Some(kb.saturating_mul(1024))
        })
    };
    match (field("MemTotal"), field("MemAvailable")) {
        (Some(total), Some(available)) => Ok((total, available)),
        _ => Err(CompanionError::Sampling(
            "MemTotal/MemAvailable missing from /proc/meminfo".to_string(),
        )),
    }
}

/// Aggregate CPU jiffies from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

impl CpuTimes {
    fn busy_percent_since(&self, earlier: &CpuTimes) -> f64 {
        let total = self.total.saturating_sub(earlier.total);
        let idle = self.idle.saturating_sub(earlier.idle);
        percent(total.saturating_sub(idle), total)
    }
}

fn parse_cpu_times(content: &str) -> Result<CpuTimes> {
    let line = content
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| CompanionError::Sampling("no aggregate cpu line in /proc/stat".into()))?;
    let values = line
        .split_whitespace()
        .skip(1)
        .map(|v| v.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CompanionError::Sampling(format!("malformed /proc/stat: {e}")))?;
    if values.len() < 4 {
        return Err(CompanionError::Sampling("short cpu line in /proc/stat".into()));
    }
    // user nice system idle iowait ...
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    Ok(CpuTimes {
        idle,
        total: values.iter().sum(),
    })
}

/// Used-space percentage of the filesystem containing `path`.
#[cfg(unix)]
fn disk_usage_percent(path: &str) -> Result<f64> {
    let c_path = std::ffi::CString::new(path)
        .map_err(|e| CompanionError::Sampling(format!("invalid path for statvfs: {e}")))?;
    // SAFETY: `statvfs` only writes into the zeroed struct we own, and
    // `c_path` is a valid NUL-terminated string for the duration of the call.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return Err(CompanionError::Sampling(format!(
            "statvfs({path}) failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    let block = stat.f_frsize as u64;
    let total = (stat.f_blocks as u64).saturating_mul(block);
    let free = (stat.f_bfree as u64).saturating_mul(block);
    Ok(percent(total.saturating_sub(free), total))
}

#[cfg(not(unix))]
fn disk_usage_percent(_path: &str) -> Result<f64> {
    Err(CompanionError::Sampling(
        "disk sampling is not supported on this platform".to_string(),
    ))
}

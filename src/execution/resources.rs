//! Resource limits for sandboxed candidate execution.
//!
//! Limits are enforced by the Docker host (cgroups), never by the
//! candidate program itself.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// CPU scheduling period in microseconds used for quota computation.
const CPU_PERIOD_MICROS: i64 = 100_000;

/// Execution resource limits for a sandbox container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Memory limit in megabytes.
    pub memory_mb: u64,
    /// CPU share in cores (e.g., 0.5, 1.0).
    pub cpu_cores: f64,
    /// Maximum number of processes allowed inside the container.
    pub max_processes: u64,
    /// Wall-clock timeout for a single execution, in seconds.
    pub timeout_seconds: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            memory_mb: 256,
            cpu_cores: 1.0,
            max_processes: 64,
            timeout_seconds: 10,
        }
    }
}

impl ExecutionLimits {
    /// Creates new execution limits with the given parameters.
    pub fn new(memory_mb: u64, cpu_cores: f64, max_processes: u64, timeout_seconds: u64) -> Self {
        Self {
            memory_mb,
            cpu_cores,
            max_processes,
            timeout_seconds,
        }
    }

    /// Returns memory limit in bytes, saturating at `i64::MAX`.
    pub fn memory_bytes(&self) -> i64 {
        i64::try_from(self.memory_mb.saturating_mul(1024 * 1024)).unwrap_or(i64::MAX)
    }

    /// Returns the CPU period in microseconds (fixed at 100ms).
    pub fn cpu_period(&self) -> i64 {
        CPU_PERIOD_MICROS
    }

    /// Returns CPU quota based on cores allocated.
    ///
    /// quota = period * cores, so 1.0 core = 100000 (100% of one CPU).
    pub fn cpu_quota(&self) -> i64 {
        (self.cpu_period() as f64 * self.cpu_cores) as i64
    }

    /// Returns the wall-clock timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Converts a raw Docker CPU quota (against the 100ms period) to cores.
    pub fn cores_from_quota(quota: i64) -> f64 {
        quota as f64 / CPU_PERIOD_MICROS as f64
    }
}

/// Parses a Docker-style memory limit (`"256m"`, `"1g"`, `"524288k"`, or
/// raw bytes) into megabytes.
///
/// Returns `None` for unparseable input or values that round to zero.
pub fn parse_memory_limit(value: &str) -> Option<u64> {
    let value = value.trim().to_ascii_lowercase();
    let value = value.strip_suffix('b').unwrap_or(&value);
    let (digits, multiplier_kb): (&str, u64) = match value.chars().last()? {
        'g' => (&value[..value.len() - 1], 1024 * 1024),
        'm' => (&value[..value.len() - 1], 1024),
        'k' => (&value[..value.len() - 1], 1),
        _ => {
            let bytes: u64 = value.parse().ok()?;
            let mb = bytes / (1024 * 1024);
            return (mb > 0).then_some(mb);
        }
    };

    let amount: u64 = digits.trim().parse().ok()?;
    let mb = amount.checked_mul(multiplier_kb)? / 1024;
    (mb > 0).then_some(mb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.memory_mb, 256);
        assert_eq!(limits.timeout(), Duration::from_secs(10));
        assert_eq!(limits.memory_bytes(), 256 * 1024 * 1024);
    }

    #[test]
    fn test_memory_bytes_saturates() {
        let huge = ExecutionLimits::new(u64::MAX / 1024, 1.0, 64, 10);
        assert_eq!(huge.memory_bytes(), i64::MAX);

        let beyond_i64 = ExecutionLimits::new(1 << 44, 1.0, 64, 10);
        assert_eq!(beyond_i64.memory_bytes(), i64::MAX);
    }

    #[test]
    fn test_cpu_quota() {
        let limits = ExecutionLimits::new(512, 0.5, 32, 5);
        assert_eq!(limits.cpu_period(), 100_000);
        assert_eq!(limits.cpu_quota(), 50_000);
        assert_eq!(ExecutionLimits::cores_from_quota(100_000), 1.0);
    }

    #[test]
    fn test_parse_memory_limit() {
        assert_eq!(parse_memory_limit("256m"), Some(256));
        assert_eq!(parse_memory_limit("1g"), Some(1024));
        assert_eq!(parse_memory_limit("2GB"), Some(2048));
        assert_eq!(parse_memory_limit("524288k"), Some(512));
        assert_eq!(parse_memory_limit("268435456"), Some(256));
        assert_eq!(parse_memory_limit("12"), None);
        assert_eq!(parse_memory_limit("lots"), None);
        assert_eq!(parse_memory_limit(""), None);
    }
}

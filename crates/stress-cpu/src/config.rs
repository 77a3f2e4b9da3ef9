//! CPU load configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the load executable when none is configured
pub const DEFAULT_EXECUTABLE: &str = "cpu_stress";

/// How the load executable is found and supervised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuLoadConfig {
    /// Path or bare program name of the load executable
    pub executable: PathBuf,

    /// Time allowed between SIGTERM and a forced kill
    #[serde(with = "duration_millis")]
    pub grace_period: Duration,

    /// Interval for liveness polling
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

impl CpuLoadConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.executable.as_os_str().is_empty() {
            return Err("CPU load executable must not be empty".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("Poll interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for CpuLoadConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            grace_period: Duration::from_secs(3),
            poll_interval: Duration::from_millis(100),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CpuLoadConfig::default();
        assert_eq!(config.executable, PathBuf::from("cpu_stress"));
        assert_eq!(config.grace_period, Duration::from_secs(3));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(CpuLoadConfig::new("").validate().is_err());
        let config = CpuLoadConfig::new("load").with_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}

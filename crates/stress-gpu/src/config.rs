//! Stress configuration

use crate::device::DeviceClass;
use crate::kernel::WORK_ITEMS_PER_UNIT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Compute backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Every compiled-in backend, CUDA first
    Auto,
    /// NVIDIA CUDA driver API
    Cuda,
    /// Local CPU through rayon
    Host,
    /// Mock backend for testing
    Mock,
}

/// Top-level stressor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Backend(s) to enumerate
    pub backend: BackendKind,

    /// Device class a stressor must bind to
    pub device_class: DeviceClass,

    /// Telemetry probe configuration
    pub telemetry: TelemetryConfig,

    /// Kernel sizing configuration
    pub kernel: KernelConfig,
}

/// Telemetry probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Query the external diagnostic tool at all
    pub enabled: bool,

    /// Diagnostic program name or path
    pub program: String,

    /// Diagnostic tool index to query; when unset the resolved device's own
    /// identifier (its PCI address for CUDA) is used
    pub device_index: Option<u32>,

    /// Upper bound for one diagnostic invocation
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
}

/// Kernel sizing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Work items launched per active parallel unit before profile scaling
    pub work_items_per_unit: u64,
}

impl StressConfig {
    /// Create a new configuration for a backend
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Set the required device class
    pub fn with_device_class(mut self, class: DeviceClass) -> Self {
        self.device_class = class;
        self
    }

    /// Enable or disable telemetry
    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.telemetry.enabled = enabled;
        self
    }

    /// Set the diagnostic program
    pub fn with_telemetry_program(mut self, program: impl Into<String>) -> Self {
        self.telemetry.program = program.into();
        self
    }

    /// Set the diagnostic timeout
    pub fn with_telemetry_timeout(mut self, timeout: Duration) -> Self {
        self.telemetry.timeout = timeout;
        self
    }

    /// Set the per-unit work item count
    pub fn with_work_items_per_unit(mut self, work_items: u64) -> Self {
        self.kernel.work_items_per_unit = work_items;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.telemetry.enabled {
            if self.telemetry.program.trim().is_empty() {
                return Err("Telemetry program must not be empty".to_string());
            }
            if self.telemetry.timeout.is_zero() {
                return Err("Telemetry timeout must be greater than zero".to_string());
            }
        }

        if self.kernel.work_items_per_unit == 0 {
            return Err("Work items per unit must be greater than zero".to_string());
        }

        Ok(())
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            device_class: DeviceClass::Gpu,
            telemetry: TelemetryConfig::default(),
            kernel: KernelConfig::default(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "nvidia-smi".to_string(),
            device_index: None,
            timeout: Duration::from_secs(2),
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            work_items_per_unit: WORK_ITEMS_PER_UNIT,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Auto => write!(f, "auto"),
            BackendKind::Cuda => write!(f, "cuda"),
            BackendKind::Host => write!(f, "host"),
            BackendKind::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "cuda" => Ok(BackendKind::Cuda),
            "host" | "cpu" => Ok(BackendKind::Host),
            "mock" => Ok(BackendKind::Mock),
            _ => Err(format!("Unknown compute backend: {}", s)),
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

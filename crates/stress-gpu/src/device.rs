//! Compute device discovery

use crate::backend::{ComputeDevice, ComputePlatform};
use crate::{Result, StressError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Device classes a stressor can bind to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Discrete or integrated GPU
    Gpu,
    /// Host CPU
    Cpu,
    /// Other accelerator
    Accelerator,
}

/// Static capability information for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name/model
    pub name: String,

    /// Device vendor
    pub vendor: String,

    /// Device class
    pub class: DeviceClass,

    /// Hardware parallel execution slices (SMs, compute units, cores)
    pub parallel_unit_count: u32,

    /// Maximum clock in MHz
    pub max_clock_mhz: u32,

    /// Global memory in bytes
    pub memory_bytes: u64,
}

impl DeviceInfo {
    /// Global memory in MiB
    pub fn memory_mib(&self) -> u64 {
        self.memory_bytes / (1024 * 1024)
    }
}

/// A device selected for a stressor, with the platform it came from
#[derive(Clone)]
pub struct ResolvedDevice {
    /// Name of the platform that exposed the device
    pub platform: String,

    /// Capability snapshot taken at resolution
    pub info: DeviceInfo,

    /// Handle used for dispatch
    pub device: Arc<dyn ComputeDevice>,
}

impl std::fmt::Debug for ResolvedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDevice")
            .field("platform", &self.platform)
            .field("info", &self.info)
            .finish()
    }
}

/// Select the first device of `class`, in platform-then-device order.
pub fn resolve_device(
    platforms: &[Arc<dyn ComputePlatform>],
    class: DeviceClass,
) -> Result<ResolvedDevice> {
    if platforms.is_empty() {
        return Err(StressError::BackendUnavailable(
            "no compute platform is enabled".to_string(),
        ));
    }

    for platform in platforms {
        let devices = match platform.devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Skipping platform {}: {}", platform.name(), e);
                continue;
            }
        };
        debug!("Platform {} exposes {} device(s)", platform.name(), devices.len());

        if let Some(device) = devices.into_iter().find(|d| d.class() == class) {
            let info = device.info().clone();
            info!(
                platform = platform.name(),
                device = %info.name,
                units = info.parallel_unit_count,
                "Resolved compute device"
            );
            return Ok(ResolvedDevice {
                platform: platform.name().to_string(),
                info,
                device,
            });
        }
    }

    Err(StressError::DeviceNotFound(format!(
        "no {:?} device on {} platform(s)",
        class,
        platforms.len()
    )))
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Gpu => write!(f, "gpu"),
            DeviceClass::Cpu => write!(f, "cpu"),
            DeviceClass::Accelerator => write!(f, "accelerator"),
        }
    }
}

impl std::str::FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gpu" => Ok(DeviceClass::Gpu),
            "cpu" => Ok(DeviceClass::Cpu),
            "accelerator" => Ok(DeviceClass::Accelerator),
            _ => Err(format!("Unknown device class: {}", s)),
        }
    }
}

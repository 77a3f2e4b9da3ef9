//! Compute backend interface

use crate::config::{BackendKind, StressConfig};
use crate::device::{DeviceClass, DeviceInfo};
use crate::{Result, StressError};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A compute API that can enumerate devices
pub trait ComputePlatform: Send + Sync {
    /// Platform name
    fn name(&self) -> &str;

    /// Devices exposed by this platform, in stable enumeration order
    fn devices(&self) -> Result<Vec<Arc<dyn ComputeDevice>>>;
}

/// One device that can run the burn kernel
pub trait ComputeDevice: Send + Sync {
    /// Capability information
    fn info(&self) -> &DeviceInfo;

    /// Device class
    fn class(&self) -> DeviceClass {
        self.info().class
    }

    /// Identifier the diagnostic tool accepts for this device (`--id=`), if known
    fn telemetry_id(&self) -> Option<String> {
        None
    }

    /// Allocate the output buffer and bind the kernel for launches of `work_items`.
    fn allocate(&self, work_items: u64) -> Result<Box<dyn BurnTarget>>;
}

/// Device resources for one launch size; dropped when the run or benchmark ends
pub trait BurnTarget: Send {
    /// Work items per dispatch
    fn work_items(&self) -> u64;

    /// Submit one burst and block until the device reports completion.
    fn dispatch(&mut self, iterations: u32) -> Result<DispatchTiming>;
}

/// Timing attached to a completed dispatch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchTiming {
    /// Time between the device-side start and end markers of the dispatch
    pub device_elapsed: Duration,
}

impl DispatchTiming {
    pub fn seconds(&self) -> f64 {
        self.device_elapsed.as_secs_f64()
    }
}

/// Platforms enabled by `config`, in enumeration order.
pub fn available_platforms(config: &StressConfig) -> Result<Vec<Arc<dyn ComputePlatform>>> {
    let mut platforms: Vec<Arc<dyn ComputePlatform>> = Vec::new();

    match config.backend {
        BackendKind::Auto => {
            #[cfg(feature = "cuda")]
            match crate::cuda::CudaPlatform::new() {
                Ok(platform) => platforms.push(Arc::new(platform)),
                Err(e) => warn!("CUDA platform unavailable: {}", e),
            }
            platforms.push(Arc::new(crate::host::HostPlatform::new()));
        }

        #[cfg(feature = "cuda")]
        BackendKind::Cuda => {
            platforms.push(Arc::new(crate::cuda::CudaPlatform::new()?));
        }

        BackendKind::Host => {
            platforms.push(Arc::new(crate::host::HostPlatform::new()));
        }

        #[cfg(any(feature = "mock", test))]
        BackendKind::Mock => {
            platforms.push(Arc::new(crate::mock::MockPlatform::default()));
        }

        #[allow(unreachable_patterns)]
        _ => {
            warn!("Compute backend {} not supported or feature not enabled", config.backend);
            return Err(StressError::BackendUnavailable(config.backend.to_string()));
        }
    }

    debug!("Enabled {} compute platform(s) for backend {}", platforms.len(), config.backend);
    Ok(platforms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_backend_platforms() {
        let config = StressConfig::new(BackendKind::Host);
        let platforms = available_platforms(&config).unwrap();
        assert_eq!(platforms.len(), 1);
        assert_eq!(platforms[0].name(), "host");
    }

    #[test]
    fn test_auto_backend_ends_with_host() {
        let config = StressConfig::new(BackendKind::Auto);
        let platforms = available_platforms(&config).unwrap();
        assert_eq!(platforms.last().map(|p| p.name()), Some("host"));
    }

    #[test]
    fn test_mock_backend_platforms() {
        let config = StressConfig::new(BackendKind::Mock);
        let platforms = available_platforms(&config).unwrap();
        assert_eq!(platforms[0].name(), "mock");
        assert!(!platforms[0].devices().unwrap().is_empty());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_without_feature_is_unavailable() {
        let config = StressConfig::new(BackendKind::Cuda);
        let result = available_platforms(&config);
        assert!(matches!(result, Err(StressError::BackendUnavailable(_))));
    }

    #[test]
    fn test_dispatch_timing_seconds() {
        let timing = DispatchTiming { device_elapsed: Duration::from_millis(250) };
        assert!((timing.seconds() - 0.25).abs() < f64::EPSILON);
    }
}

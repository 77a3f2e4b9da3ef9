//! # stress-gpu
//!
//! Thermally guarded load generation for compute devices.
//!
//! This crate provides:
//! - Compute device discovery across backends (CUDA, host CPU)
//! - A fixed fused multiply-add burn kernel with named intensity profiles
//! - A cancellable background stress loop with duration and temperature cutoffs
//! - One-shot throughput benchmarking with device-side timing
//! - Best-effort temperature and utilization telemetry
//! - Min/max/average summaries of a run's sample history
//!
//! ## Supported Backends
//!
//! - **CUDA**: NVIDIA devices through the driver API and NVRTC (`cuda` feature)
//! - **Host**: the local CPU, executing the same kernel arithmetic on a rayon pool
//! - **Mock**: scripted devices for testing (`mock` feature)
//!
//! ## Example
//!
//! ```rust,no_run
//! use stress_gpu::{RunRequest, StressConfig, StressProfile, Stressor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stressor = Stressor::new(StressConfig::default())?;
//!     println!("Stressing {}", stressor.device_info().name);
//!
//!     let request = RunRequest::new(30.0)
//!         .with_max_temperature(85)
//!         .with_profile(StressProfile::Heavy);
//!     stressor.start(request);
//!
//!     if let Some(outcome) = stressor.wait().await {
//!         println!("Run ended: {}", outcome.reason);
//!     }
//!     println!("{:?}", stressor.summarize());
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod backend;
pub mod benchmark;
pub mod config;
pub mod controller;
pub mod device;
pub mod history;
pub mod host;
pub mod kernel;
pub mod summary;
pub mod telemetry;

// Backend-specific modules
#[cfg(feature = "cuda")]
pub mod cuda;

// Mock implementation for testing
#[cfg(any(feature = "mock", test))]
pub mod mock;

// Re-export main types
pub use backend::{available_platforms, BurnTarget, ComputeDevice, ComputePlatform, DispatchTiming};
pub use benchmark::BenchmarkResult;
pub use config::{BackendKind, KernelConfig, StressConfig, TelemetryConfig};
pub use controller::{RunOutcome, RunPhase, RunRequest, StopReason, Stressor};
pub use device::{resolve_device, DeviceClass, DeviceInfo, ResolvedDevice};
pub use history::{RunHistory, Sample};
pub use kernel::{KernelLaunch, StressProfile, FLOPS_PER_ITERATION, WORK_ITEMS_PER_UNIT};
pub use summary::{summarize, Stats, Summary};
pub use telemetry::{probe_for_device, AbsentReason, DisabledProbe, HostProbe, Reading, SmiProbe, TelemetryProbe};

/// Result type for stress operations
pub type Result<T> = std::result::Result<T, StressError>;

/// Errors that can occur while driving a compute device
#[derive(Error, Debug)]
pub enum StressError {
    #[error("No compute backend available: {0}")]
    BackendUnavailable(String),

    #[error("No matching device found: {0}")]
    DeviceNotFound(String),

    #[error("Kernel dispatch failed: {0}")]
    DispatchFailure(String),

    #[error("Device busy: {0}")]
    DeviceBusy(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Device allocation failed: {0}")]
    Allocation(String),

    #[error("Kernel build failed: {0}")]
    KernelBuild(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StressError {
    /// Check if this error prevents a stressor from being constructed at all
    pub fn is_fatal_for_construction(&self) -> bool {
        matches!(
            self,
            StressError::BackendUnavailable(_)
                | StressError::DeviceNotFound(_)
                | StressError::KernelBuild(_)
                | StressError::Configuration(_)
        )
    }

    /// Check if the caller may simply try again later
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StressError::DeviceBusy(_))
    }

    /// Check if this error ends the current run
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(self, StressError::DispatchFailure(_) | StressError::Allocation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stress_error_properties() {
        let busy = StressError::DeviceBusy("run active".to_string());
        assert!(busy.is_recoverable());
        assert!(!busy.is_fatal_for_construction());
        assert!(!busy.is_dispatch_failure());

        let missing = StressError::DeviceNotFound("gpu".to_string());
        assert!(missing.is_fatal_for_construction());
        assert!(!missing.is_recoverable());

        let dispatch = StressError::DispatchFailure("launch".to_string());
        assert!(dispatch.is_dispatch_failure());
        assert!(!dispatch.is_fatal_for_construction());
        assert!(!dispatch.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = StressError::BackendUnavailable("cuda".to_string());
        assert_eq!(error.to_string(), "No compute backend available: cuda");

        let error = StressError::DeviceNotFound("class gpu".to_string());
        assert_eq!(error.to_string(), "No matching device found: class gpu");
    }
}

//! # stress-cpu
//!
//! Host CPU load through an external executable.
//!
//! The load program is opaque: it is started as `<executable> <seconds> <threads>`
//! and is expected to exit on its own once the duration has elapsed. This
//! crate supervises it (liveness, graceful termination) and reads the host's
//! thermal sensors and CPU usage so callers can enforce a temperature cutoff
//! and record what the load did.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stress_cpu::{CpuLoadConfig, CpuLoadProcess, CpuThermalSensor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut load = CpuLoadProcess::spawn(CpuLoadConfig::new("./cpu_stress"), 60, 4)?;
//!     let mut sensor = CpuThermalSensor::new();
//!
//!     while load.is_running() {
//!         if sensor.max_temperature().map_or(false, |t| t >= 90.0) {
//!             load.terminate().await?;
//!         }
//!         tokio::time::sleep(load.config().poll_interval).await;
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod config;
pub mod process;
pub mod sensor;

pub use config::CpuLoadConfig;
pub use process::CpuLoadProcess;
pub use sensor::CpuThermalSensor;

/// Result type for CPU load operations
pub type Result<T> = std::result::Result<T, CpuLoadError>;

#[derive(Error, Debug)]
pub enum CpuLoadError {
    #[error("CPU load executable not found: {0}")]
    ExecutableMissing(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to start CPU load process: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//! Host CPU backend
//!
//! Runs the burn kernel arithmetic on a dedicated rayon pool with one worker
//! per logical core. Each work item is one lane of [`burn_lane`].

use crate::backend::{BurnTarget, ComputeDevice, ComputePlatform, DispatchTiming};
use crate::device::{DeviceClass, DeviceInfo};
use crate::kernel::burn_lane;
use crate::{Result, StressError};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use std::time::Instant;
use sysinfo::System;
use tracing::{debug, info};

/// Platform exposing the local CPU as a single device
pub struct HostPlatform {
    name: String,
}

impl HostPlatform {
    pub fn new() -> Self {
        Self {
            name: "host".to_string(),
        }
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputePlatform for HostPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn devices(&self) -> Result<Vec<Arc<dyn ComputeDevice>>> {
        Ok(vec![Arc::new(HostDevice::detect()?)])
    }
}

/// The local CPU
pub struct HostDevice {
    info: DeviceInfo,
    pool: Arc<ThreadPool>,
}

impl HostDevice {
    /// Probe the CPU and build the worker pool
    pub fn detect() -> Result<Self> {
        let mut system = System::new_all();
        system.refresh_cpu();

        let logical = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or_else(|_| system.cpus().len().max(1));

        let (name, vendor, clock) = system
            .cpus()
            .first()
            .map(|cpu| (cpu.brand().trim().to_string(), cpu.vendor_id().trim().to_string(), cpu.frequency()))
            .unwrap_or_else(|| ("Unknown CPU".to_string(), "Unknown".to_string(), 0));

        let info = DeviceInfo {
            name: if name.is_empty() { "Unknown CPU".to_string() } else { name },
            vendor,
            class: DeviceClass::Cpu,
            parallel_unit_count: logical as u32,
            max_clock_mhz: clock as u32,
            memory_bytes: system.total_memory(),
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(logical)
            .thread_name(|i| format!("stress-host-{}", i))
            .build()
            .map_err(|e| StressError::BackendUnavailable(format!("host worker pool: {}", e)))?;

        info!("Host device {} with {} logical cores", info.name, logical);
        Ok(Self {
            info,
            pool: Arc::new(pool),
        })
    }
}

impl ComputeDevice for HostDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn allocate(&self, work_items: u64) -> Result<Box<dyn BurnTarget>> {
        let len = usize::try_from(work_items)
            .map_err(|_| StressError::Allocation(format!("{} work items exceed address space", work_items)))?;

        let mut buffer: Vec<f32> = Vec::new();
        buffer
            .try_reserve_exact(len)
            .map_err(|e| StressError::Allocation(format!("{} floats: {}", len, e)))?;
        buffer.resize(len, 0.0);

        debug!("Allocated host buffer of {} work items", len);
        Ok(Box::new(HostBurnTarget {
            pool: Arc::clone(&self.pool),
            buffer,
        }))
    }
}

struct HostBurnTarget {
    pool: Arc<ThreadPool>,
    buffer: Vec<f32>,
}

impl BurnTarget for HostBurnTarget {
    fn work_items(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn dispatch(&mut self, iterations: u32) -> Result<DispatchTiming> {
        let buffer = &mut self.buffer;
        let started = Instant::now();
        self.pool.install(|| {
            buffer
                .par_iter_mut()
                .enumerate()
                .for_each(|(gid, slot)| *slot = burn_lane(gid, iterations));
        });
        Ok(DispatchTiming {
            device_elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_platform_exposes_one_cpu() {
        let platform = HostPlatform::new();
        let devices = platform.devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].class(), DeviceClass::Cpu);
        assert!(devices[0].info().parallel_unit_count >= 1);
    }

    #[test]
    fn test_host_dispatch_writes_every_lane() {
        let device = HostDevice::detect().unwrap();
        let mut target = device.allocate(512).unwrap();
        assert_eq!(target.work_items(), 512);

        assert!(target.dispatch(16).is_ok());
    }

    #[test]
    fn test_host_lane_values_match_reference() {
        let device = HostDevice::detect().unwrap();
        let pool = Arc::clone(&device.pool);
        let mut target = HostBurnTarget {
            pool,
            buffer: vec![0.0; 8],
        };
        target.dispatch(3).unwrap();
        for (gid, value) in target.buffer.iter().enumerate() {
            assert_eq!(*value, burn_lane(gid, 3));
        }
    }
}

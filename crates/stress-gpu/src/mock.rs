//! Mock compute backend and telemetry for testing

use crate::backend::{BurnTarget, ComputeDevice, ComputePlatform, DispatchTiming};
use crate::device::{DeviceClass, DeviceInfo, ResolvedDevice};
use crate::telemetry::{AbsentReason, Reading, TelemetryProbe};
use crate::{Result, StressError};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Mock platform with a fixed device list
pub struct MockPlatform {
    name: String,
    devices: Vec<Arc<MockDevice>>,
    fail_enumeration: bool,
}

impl MockPlatform {
    /// Create a platform exposing `devices` in order
    pub fn new(name: &str, devices: Vec<MockDevice>) -> Self {
        Self {
            name: name.to_string(),
            devices: devices.into_iter().map(Arc::new).collect(),
            fail_enumeration: false,
        }
    }

    /// Create a platform whose enumeration always fails
    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            devices: Vec::new(),
            fail_enumeration: true,
        }
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new(
            "mock",
            vec![MockDevice::gpu("Mock GPU 0", 4).with_burst_latency(Duration::from_millis(20))],
        )
    }
}

impl ComputePlatform for MockPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn devices(&self) -> Result<Vec<Arc<dyn ComputeDevice>>> {
        if self.fail_enumeration {
            return Err(StressError::BackendUnavailable(format!("{} enumeration failed", self.name)));
        }
        Ok(self
            .devices
            .iter()
            .map(|d| Arc::clone(d) as Arc<dyn ComputeDevice>)
            .collect())
    }
}

/// Counters shared between a mock device and its burn targets
#[derive(Debug, Default)]
pub struct MockCounters {
    /// Completed or failed dispatches
    pub dispatches: AtomicU64,
    /// Allocations made
    pub allocations: AtomicU64,
    /// Dispatches currently executing
    pub in_flight: AtomicU64,
    /// Highest concurrent dispatch count observed
    pub max_in_flight: AtomicU64,
    /// Work items of the most recent allocation
    pub last_work_items: AtomicU64,
}

/// Scripted device
pub struct MockDevice {
    info: DeviceInfo,
    burst_latency: Duration,
    device_time: Option<Duration>,
    fail_on_dispatch: Option<u64>,
    fail_allocation: bool,
    telemetry_id: Option<String>,
    counters: Arc<MockCounters>,
}

impl MockDevice {
    /// Mock GPU with `units` parallel units
    pub fn gpu(name: &str, units: u32) -> Self {
        Self::with_class(name, units, DeviceClass::Gpu)
    }

    /// Mock CPU with `units` cores
    pub fn cpu(name: &str, units: u32) -> Self {
        Self::with_class(name, units, DeviceClass::Cpu)
    }

    fn with_class(name: &str, units: u32, class: DeviceClass) -> Self {
        Self {
            info: DeviceInfo {
                name: name.to_string(),
                vendor: "MockVendor".to_string(),
                class,
                parallel_unit_count: units,
                max_clock_mhz: 1500,
                memory_bytes: 8 * 1024 * 1024 * 1024,
            },
            burst_latency: Duration::from_millis(1),
            device_time: None,
            fail_on_dispatch: None,
            fail_allocation: false,
            telemetry_id: None,
            counters: Arc::new(MockCounters::default()),
        }
    }

    /// Wall time each dispatch blocks for
    pub fn with_burst_latency(mut self, latency: Duration) -> Self {
        self.burst_latency = latency;
        self
    }

    /// Device time reported for each dispatch (defaults to the burst latency)
    pub fn with_device_time(mut self, device_time: Duration) -> Self {
        self.device_time = Some(device_time);
        self
    }

    /// Fail the n-th dispatch (1-based) of every target
    pub fn fail_on_dispatch(mut self, n: u64) -> Self {
        self.fail_on_dispatch = Some(n);
        self
    }

    /// Fail every allocation
    pub fn fail_allocation(mut self) -> Self {
        self.fail_allocation = true;
        self
    }

    /// Identifier handed to the diagnostic tool
    pub fn with_telemetry_id(mut self, id: impl Into<String>) -> Self {
        self.telemetry_id = Some(id.into());
        self
    }

    /// Shared counters
    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }

    /// Wrap this device as if it had been resolved from a `mock` platform
    pub fn into_resolved(self) -> ResolvedDevice {
        ResolvedDevice {
            platform: "mock".to_string(),
            info: self.info.clone(),
            device: Arc::new(self),
        }
    }
}

impl ComputeDevice for MockDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn telemetry_id(&self) -> Option<String> {
        self.telemetry_id.clone()
    }

    fn allocate(&self, work_items: u64) -> Result<Box<dyn BurnTarget>> {
        if self.fail_allocation {
            return Err(StressError::Allocation("mock allocation failure".to_string()));
        }
        self.counters.allocations.fetch_add(1, Ordering::SeqCst);
        self.counters.last_work_items.store(work_items, Ordering::SeqCst);
        Ok(Box::new(MockBurnTarget {
            work_items,
            burst_latency: self.burst_latency,
            device_time: self.device_time.unwrap_or(self.burst_latency),
            fail_on_dispatch: self.fail_on_dispatch,
            dispatched: 0,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct MockBurnTarget {
    work_items: u64,
    burst_latency: Duration,
    device_time: Duration,
    fail_on_dispatch: Option<u64>,
    dispatched: u64,
    counters: Arc<MockCounters>,
}

impl BurnTarget for MockBurnTarget {
    fn work_items(&self) -> u64 {
        self.work_items
    }

    fn dispatch(&mut self, iterations: u32) -> Result<DispatchTiming> {
        self.dispatched += 1;
        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        std::thread::sleep(self.burst_latency);

        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.counters.dispatches.fetch_add(1, Ordering::SeqCst);
        debug!("Mock dispatch {} ({} iterations)", self.dispatched, iterations);

        if self.fail_on_dispatch == Some(self.dispatched) {
            return Err(StressError::DispatchFailure(format!(
                "mock failure on dispatch {}",
                self.dispatched
            )));
        }

        Ok(DispatchTiming {
            device_elapsed: self.device_time,
        })
    }
}

/// Scripted telemetry probe
///
/// Temperature readings are served from a queue; the last entry repeats once
/// the queue is drained.
pub struct MockProbe {
    temperatures: Mutex<VecDeque<Reading>>,
    utilization: Reading,
    temperature_reads: AtomicU64,
}

impl MockProbe {
    /// Probe that always reports `temperature` and `utilization`
    pub fn constant(temperature: i32, utilization: i32) -> Self {
        Self::sequence(vec![Reading::Value(temperature)], Reading::Value(utilization))
    }

    /// Probe that serves `temperatures` in order
    pub fn sequence(temperatures: Vec<Reading>, utilization: Reading) -> Self {
        Self {
            temperatures: Mutex::new(temperatures.into()),
            utilization,
            temperature_reads: AtomicU64::new(0),
        }
    }

    /// Probe with no telemetry at all
    pub fn absent() -> Self {
        Self::sequence(
            vec![Reading::Absent(AbsentReason::ToolMissing)],
            Reading::Absent(AbsentReason::ToolMissing),
        )
    }

    /// Number of temperature reads served
    pub fn temperature_reads(&self) -> u64 {
        self.temperature_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetryProbe for MockProbe {
    async fn read_temperature(&self) -> Reading {
        self.temperature_reads.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.temperatures.lock();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(Reading::Absent(AbsentReason::Disabled))
        } else {
            queue.front().cloned().unwrap_or(Reading::Absent(AbsentReason::Disabled))
        }
    }

    async fn read_utilization(&self) -> Reading {
        self.utilization.clone()
    }
}

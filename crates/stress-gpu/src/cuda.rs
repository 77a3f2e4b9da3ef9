//! NVIDIA CUDA backend
//!
//! Devices are enumerated through the driver API. The burn kernel is compiled
//! with NVRTC once per device and launched on the context's default stream;
//! dispatch timing comes from a pair of events recorded around the launch.

use crate::backend::{BurnTarget, ComputeDevice, ComputePlatform, DispatchTiming};
use crate::device::{DeviceClass, DeviceInfo};
use crate::kernel::{BURN_KERNEL_NAME, BURN_KERNEL_SOURCE};
use crate::{Result, StressError};

use cudarc::driver::sys::{CUdevice_attribute, CUevent_flags};
use cudarc::driver::{CudaContext, CudaFunction, CudaSlice, CudaStream, LaunchConfig, PushKernelArg};
use cudarc::nvrtc::compile_ptx;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const THREADS_PER_BLOCK: u32 = 256;

/// CUDA driver platform
pub struct CudaPlatform {
    device_count: usize,
}

impl CudaPlatform {
    /// Load the driver and count devices.
    pub fn new() -> Result<Self> {
        let count = CudaContext::device_count()
            .map_err(|e| StressError::BackendUnavailable(format!("CUDA driver: {:?}", e)))?;
        let device_count = usize::try_from(count).unwrap_or(0);
        if device_count == 0 {
            return Err(StressError::BackendUnavailable("no CUDA devices present".to_string()));
        }
        info!("CUDA driver reports {} device(s)", device_count);
        Ok(Self { device_count })
    }
}

impl ComputePlatform for CudaPlatform {
    fn name(&self) -> &str {
        "cuda"
    }

    fn devices(&self) -> Result<Vec<Arc<dyn ComputeDevice>>> {
        let mut devices: Vec<Arc<dyn ComputeDevice>> = Vec::with_capacity(self.device_count);
        for ordinal in 0..self.device_count {
            match CudaDevice::open(ordinal) {
                Ok(device) => devices.push(Arc::new(device)),
                Err(e) => warn!("Skipping CUDA device {}: {}", ordinal, e),
            }
        }
        Ok(devices)
    }
}

/// One CUDA device with its compiled burn kernel
pub struct CudaDevice {
    info: DeviceInfo,
    /// PCI address, the form `nvidia-smi --id` accepts
    pci_bus_id: Option<String>,
    stream: Arc<CudaStream>,
    kernel: CudaFunction,
    // The default stream is shared; keep submissions from separate targets apart
    submit: Arc<Mutex<()>>,
}

impl CudaDevice {
    fn open(ordinal: usize) -> Result<Self> {
        let ctx = CudaContext::new(ordinal)
            .map_err(|e| StressError::DeviceNotFound(format!("CUDA device {}: {:?}", ordinal, e)))?;

        let name = ctx.name().map_err(driver_err)?;
        let units = ctx
            .attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT)
            .map_err(driver_err)?;
        let clock_khz = ctx
            .attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_CLOCK_RATE)
            .map_err(driver_err)?;
        let memory_bytes = unsafe { cudarc::driver::result::device::total_mem(ctx.cu_device()) }
            .map_err(driver_err)?;

        let ptx = compile_ptx(BURN_KERNEL_SOURCE).map_err(|e| StressError::KernelBuild(format!("{:?}", e)))?;
        let module = ctx
            .load_module(ptx)
            .map_err(|e| StressError::KernelBuild(format!("load module: {:?}", e)))?;
        let kernel = module
            .load_function(BURN_KERNEL_NAME)
            .map_err(|e| StressError::KernelBuild(format!("load function: {:?}", e)))?;

        let info = DeviceInfo {
            name,
            vendor: "NVIDIA".to_string(),
            class: DeviceClass::Gpu,
            parallel_unit_count: u32::try_from(units).unwrap_or(1).max(1),
            max_clock_mhz: u32::try_from(clock_khz / 1000).unwrap_or(0),
            memory_bytes: memory_bytes as u64,
        };
        // CUDA and nvidia-smi number devices differently; the PCI address is shared
        let pci_bus_id = pci_bus_id(&ctx);
        debug!("Opened CUDA device {} ({:?}): {:?}", ordinal, pci_bus_id, info);

        Ok(Self {
            info,
            pci_bus_id,
            stream: ctx.default_stream(),
            kernel,
            submit: Arc::new(Mutex::new(())),
        })
    }
}

fn pci_bus_id(ctx: &CudaContext) -> Option<String> {
    let domain = ctx.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_PCI_DOMAIN_ID).ok()?;
    let bus = ctx.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_PCI_BUS_ID).ok()?;
    let device = ctx.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_PCI_DEVICE_ID).ok()?;
    Some(format_pci_bus_id(domain, bus, device))
}

/// `domain:bus:device.function` in the upper-case hex layout nvidia-smi prints
fn format_pci_bus_id(domain: i32, bus: i32, device: i32) -> String {
    format!("{:08X}:{:02X}:{:02X}.0", domain, bus, device)
}

impl ComputeDevice for CudaDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn telemetry_id(&self) -> Option<String> {
        self.pci_bus_id.clone()
    }

    fn allocate(&self, work_items: u64) -> Result<Box<dyn BurnTarget>> {
        let n = u32::try_from(work_items).map_err(|_| {
            StressError::Allocation(format!("{} work items exceed a single launch", work_items))
        })?;
        let buffer = self
            .stream
            .alloc_zeros::<f32>(n as usize)
            .map_err(|e| StressError::Allocation(format!("{:?}", e)))?;

        Ok(Box::new(CudaBurnTarget {
            stream: Arc::clone(&self.stream),
            kernel: self.kernel.clone(),
            submit: Arc::clone(&self.submit),
            buffer,
            n,
        }))
    }
}

struct CudaBurnTarget {
    stream: Arc<CudaStream>,
    kernel: CudaFunction,
    submit: Arc<Mutex<()>>,
    buffer: CudaSlice<f32>,
    n: u32,
}

impl BurnTarget for CudaBurnTarget {
    fn work_items(&self) -> u64 {
        u64::from(self.n)
    }

    fn dispatch(&mut self, iterations: u32) -> Result<DispatchTiming> {
        let _submit = self.submit.lock();
        let iterations = i32::try_from(iterations).unwrap_or(i32::MAX);
        let cfg = LaunchConfig {
            grid_dim: (self.n.div_ceil(THREADS_PER_BLOCK), 1, 1),
            block_dim: (THREADS_PER_BLOCK, 1, 1),
            shared_mem_bytes: 0,
        };

        let start = self
            .stream
            .record_event(Some(CUevent_flags::CU_EVENT_DEFAULT))
            .map_err(dispatch_err)?;
        unsafe {
            let mut launch = self.stream.launch_builder(&self.kernel);
            launch.arg(&mut self.buffer).arg(&iterations).arg(&self.n);
            launch.launch(cfg).map_err(dispatch_err)?;
        }
        let end = self
            .stream
            .record_event(Some(CUevent_flags::CU_EVENT_DEFAULT))
            .map_err(dispatch_err)?;

        self.stream.synchronize().map_err(dispatch_err)?;
        let millis = start.elapsed_ms(&end).map_err(dispatch_err)?;

        Ok(DispatchTiming {
            device_elapsed: Duration::from_secs_f64(f64::from(millis.max(0.0)) / 1000.0),
        })
    }
}

fn driver_err(e: cudarc::driver::DriverError) -> StressError {
    StressError::DeviceNotFound(format!("CUDA query failed: {:?}", e))
}

fn dispatch_err(e: cudarc::driver::DriverError) -> StressError {
    StressError::DispatchFailure(format!("{:?}", e))
}

//! Best-effort device telemetry
//!
//! GPU readings come from an external diagnostic tool (`nvidia-smi` by
//! default); CPU readings come from the host's own sensors. A probe never
//! returns an error: every failure degrades to
//! [`Reading::Absent`] with the reason attached, so callers can tell an
//! unavailable sensor apart from a value over a threshold.

use crate::config::TelemetryConfig;
use crate::device::{DeviceClass, ResolvedDevice};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::time::timeout;
use stress_cpu::CpuThermalSensor;
use tracing::{debug, warn};

/// Diagnostic field for the device temperature in °C
pub const TEMPERATURE_FIELD: &str = "temperature.gpu";

/// Diagnostic field for the device utilization in %
pub const UTILIZATION_FIELD: &str = "utilization.gpu";

/// Outcome of one telemetry query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reading {
    Value(i32),
    Absent(AbsentReason),
}

/// Why a reading is absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsentReason {
    /// Telemetry turned off in configuration
    Disabled,
    /// Diagnostic program not installed
    ToolMissing,
    /// Program could not be started
    Spawn(String),
    /// Program exited unsuccessfully
    NonZeroExit(Option<i32>),
    /// Program exceeded the configured timeout
    Timeout,
    /// Output did not start with a number
    Unparsable(String),
    /// The host exposes no sensor for this reading
    NoSensor,
}

impl Reading {
    /// The value, if one was read
    pub fn value(&self) -> Option<i32> {
        match self {
            Reading::Value(v) => Some(*v),
            Reading::Absent(_) => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Reading::Absent(_))
    }
}

impl std::fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbsentReason::Disabled => write!(f, "telemetry disabled"),
            AbsentReason::ToolMissing => write!(f, "diagnostic tool not found"),
            AbsentReason::Spawn(e) => write!(f, "failed to start diagnostic tool: {}", e),
            AbsentReason::NonZeroExit(Some(code)) => write!(f, "diagnostic tool exited with {}", code),
            AbsentReason::NonZeroExit(None) => write!(f, "diagnostic tool killed by signal"),
            AbsentReason::Timeout => write!(f, "diagnostic tool timed out"),
            AbsentReason::Unparsable(text) => write!(f, "unparsable output {:?}", text),
            AbsentReason::NoSensor => write!(f, "no host sensor"),
        }
    }
}

/// Source of temperature and utilization readings
#[async_trait]
pub trait TelemetryProbe: Send + Sync {
    /// Device temperature in °C
    async fn read_temperature(&self) -> Reading;

    /// Device utilization in %
    async fn read_utilization(&self) -> Reading;
}

/// Probe that never reports anything
#[derive(Debug, Default, Clone)]
pub struct DisabledProbe;

#[async_trait]
impl TelemetryProbe for DisabledProbe {
    async fn read_temperature(&self) -> Reading {
        Reading::Absent(AbsentReason::Disabled)
    }

    async fn read_utilization(&self) -> Reading {
        Reading::Absent(AbsentReason::Disabled)
    }
}

/// Probe backed by an `nvidia-smi` compatible command line tool
#[derive(Debug, Clone)]
pub struct SmiProbe {
    config: TelemetryConfig,
    device_id: Option<String>,
}

impl SmiProbe {
    pub fn new(config: TelemetryConfig) -> Self {
        let device_id = config.device_index.map(|index| index.to_string());
        Self { config, device_id }
    }

    /// Query this device (`--id=<id>`) instead of the configured index
    pub fn with_device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Query one field and parse the first value of the first output line.
    pub async fn query(&self, field: &str) -> Reading {
        if !self.config.enabled {
            return Reading::Absent(AbsentReason::Disabled);
        }

        let mut command = Command::new(&self.config.program);
        command
            .arg(format!("--query-gpu={}", field))
            .arg("--format=csv,noheader,nounits");
        if let Some(id) = &self.device_id {
            command.arg(format!("--id={}", id));
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout(self.config.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return absent(field, AbsentReason::ToolMissing);
            }
            Ok(Err(e)) => return absent(field, AbsentReason::Spawn(e.to_string())),
            Err(_) => return absent(field, AbsentReason::Timeout),
        };

        if !output.status.success() {
            return absent(field, AbsentReason::NonZeroExit(output.status.code()));
        }

        match parse_first_value(&String::from_utf8_lossy(&output.stdout)) {
            Ok(value) => Reading::Value(value),
            Err(reason) => absent(field, reason),
        }
    }
}

#[async_trait]
impl TelemetryProbe for SmiProbe {
    async fn read_temperature(&self) -> Reading {
        self.query(TEMPERATURE_FIELD).await
    }

    async fn read_utilization(&self) -> Reading {
        self.query(UTILIZATION_FIELD).await
    }
}

/// Probe reading the host's CPU temperature and usage
pub struct HostProbe {
    sensor: Arc<Mutex<CpuThermalSensor>>,
}

impl HostProbe {
    pub fn new() -> Self {
        Self {
            sensor: Arc::new(Mutex::new(CpuThermalSensor::new())),
        }
    }

    /// Whether the host exposes any temperature sensor
    pub fn has_temperature_sensor(&self) -> bool {
        self.sensor.lock().is_available()
    }

    async fn read_with(&self, field: &'static str, read: fn(&mut CpuThermalSensor) -> Option<f32>) -> Reading {
        let sensor = Arc::clone(&self.sensor);
        match tokio::task::spawn_blocking(move || read(&mut sensor.lock())).await {
            Ok(Some(value)) if value.is_finite() => Reading::Value(value.round() as i32),
            Ok(_) => absent(field, AbsentReason::NoSensor),
            Err(e) => absent(field, AbsentReason::Spawn(e.to_string())),
        }
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryProbe for HostProbe {
    async fn read_temperature(&self) -> Reading {
        self.read_with("cpu temperature", CpuThermalSensor::max_temperature).await
    }

    async fn read_utilization(&self) -> Reading {
        self.read_with("cpu usage", CpuThermalSensor::cpu_usage).await
    }
}

/// Build the probe that measures `device`.
///
/// CPUs are read from host sensors; other classes go through the diagnostic
/// tool, addressed by the configured index or the device's own identifier.
pub fn probe_for_device(config: &TelemetryConfig, device: &ResolvedDevice) -> Arc<dyn TelemetryProbe> {
    if !config.enabled {
        return Arc::new(DisabledProbe);
    }

    match device.info.class {
        DeviceClass::Cpu => {
            let probe = HostProbe::new();
            if !probe.has_temperature_sensor() {
                warn!("No host temperature sensor found, temperature limits on {} cannot trip", device.info.name);
            }
            Arc::new(probe)
        }
        DeviceClass::Gpu | DeviceClass::Accelerator => {
            let mut probe = SmiProbe::new(config.clone());
            if config.device_index.is_none() {
                if let Some(id) = device.device.telemetry_id() {
                    probe = probe.with_device_id(id);
                }
            }
            debug!(program = %config.program, id = ?probe.device_id(), "Using diagnostic tool telemetry");
            Arc::new(probe)
        }
    }
}

/// Parse the first comma-separated field of the first line.
///
/// Decimal values are rounded to the nearest integer.
pub fn parse_first_value(output: &str) -> Result<i32, AbsentReason> {
    let line = output.lines().next().unwrap_or("").trim();
    let field = line.split(',').next().unwrap_or("").trim();

    if let Ok(value) = field.parse::<i32>() {
        return Ok(value);
    }
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value.round() as i32),
        _ => Err(AbsentReason::Unparsable(field.to_string())),
    }
}

fn absent(field: &str, reason: AbsentReason) -> Reading {
    debug!(field, %reason, "Telemetry reading absent");
    Reading::Absent(reason)
}

//! Host thermal sensors and CPU load

use sysinfo::{Components, System};
use tracing::debug;

/// Reads the host's hardware temperature sensors and overall CPU usage
pub struct CpuThermalSensor {
    components: Components,
    system: System,
}

impl CpuThermalSensor {
    pub fn new() -> Self {
        let components = Components::new_with_refreshed_list();
        debug!("Found {} thermal sensor(s)", components.list().len());

        // Usage is a delta between refreshes; take the baseline now
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self { components, system }
    }

    /// Whether any sensor was discovered
    pub fn is_available(&self) -> bool {
        !self.components.list().is_empty()
    }

    /// Hottest current reading in °C, if any sensor reports one.
    pub fn max_temperature(&mut self) -> Option<f32> {
        self.components.refresh();
        hottest(self.components.list().iter().map(|c| c.temperature()))
    }

    /// Average usage across all CPUs in %, since the previous call.
    pub fn cpu_usage(&mut self) -> Option<f32> {
        self.system.refresh_cpu_usage();
        if self.system.cpus().is_empty() {
            return None;
        }
        Some(self.system.global_cpu_info().cpu_usage()).filter(|u| u.is_finite())
    }

    /// Current readings by sensor label
    pub fn readings(&mut self) -> Vec<(String, f32)> {
        self.components.refresh();
        self.components
            .list()
            .iter()
            .filter(|c| is_plausible(c.temperature()))
            .map(|c| (c.label().to_string(), c.temperature()))
            .collect()
    }
}

impl Default for CpuThermalSensor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_plausible(temperature: f32) -> bool {
    temperature.is_finite() && temperature > 0.0
}

fn hottest(temperatures: impl Iterator<Item = f32>) -> Option<f32> {
    temperatures
        .filter(|t| is_plausible(*t))
        .fold(None, |max, t| Some(max.map_or(t, |m: f32| m.max(t))))
}

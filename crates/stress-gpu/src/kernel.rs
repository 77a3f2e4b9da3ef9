//! Burn kernel, stress profiles and launch sizing

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Work items launched per active parallel unit, before profile scaling
pub const WORK_ITEMS_PER_UNIT: u64 = 65_536;

/// Floating-point operations per inner kernel iteration (two multiplies, two adds)
pub const FLOPS_PER_ITERATION: u64 = 4;

/// Entry point name of the burn kernel
pub const BURN_KERNEL_NAME: &str = "burn";

/// Device source of the burn kernel
pub const BURN_KERNEL_SOURCE: &str = r#"
extern "C" __global__ void burn(float *a, int iterations, unsigned int n) {
    unsigned int gid = blockIdx.x * blockDim.x + threadIdx.x;
    if (gid >= n) {
        return;
    }
    float x = (float)(gid + 1);
    for (int i = 0; i < iterations; i++) {
        x = x * 1.000001f + 0.000001f;
        x = x * x + 1.0f;
    }
    a[gid] = x;
}
"#;

/// Host reference of one kernel lane.
///
/// Performs exactly [`FLOPS_PER_ITERATION`] floating-point operations per iteration.
#[inline]
pub fn burn_lane(gid: usize, iterations: u32) -> f32 {
    let mut x = (gid + 1) as f32;
    for _ in 0..iterations {
        x = x * 1.000_001 + 0.000_001;
        x = x * x + 1.0;
    }
    x
}

/// Named intensity presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressProfile {
    Light,
    #[default]
    Medium,
    Heavy,
}

impl StressProfile {
    /// All profiles, lightest first
    pub const ALL: [StressProfile; 3] = [StressProfile::Light, StressProfile::Medium, StressProfile::Heavy];

    /// Inner loop iterations per work item
    pub fn iterations(self) -> u32 {
        match self {
            StressProfile::Light => 50_000,
            StressProfile::Medium => 200_000,
            StressProfile::Heavy => 400_000,
        }
    }

    /// Multiplier on the per-unit work item count
    pub fn work_item_scale(self) -> u64 {
        match self {
            StressProfile::Light | StressProfile::Medium => 1,
            StressProfile::Heavy => 2,
        }
    }

    /// Lenient lookup used at input boundaries; unknown names map to `Medium`.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!("Unknown stress profile {:?}, using {}", name, StressProfile::default());
            StressProfile::default()
        })
    }
}

impl std::fmt::Display for StressProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StressProfile::Light => write!(f, "light"),
            StressProfile::Medium => write!(f, "medium"),
            StressProfile::Heavy => write!(f, "heavy"),
        }
    }
}

impl std::str::FromStr for StressProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(StressProfile::Light),
            "medium" => Ok(StressProfile::Medium),
            "heavy" => Ok(StressProfile::Heavy),
            _ => Err(format!("Unknown stress profile: {}", s)),
        }
    }
}

/// Dispatch parameters of one kernel burst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelLaunch {
    /// Total work items in the 1-D grid
    pub work_items: u64,

    /// Inner loop iterations per work item
    pub iterations: u32,
}

impl KernelLaunch {
    /// Size a launch for `profile` on `active_units` units.
    pub fn new(profile: StressProfile, active_units: u32, work_items_per_unit: u64) -> Self {
        Self {
            work_items: u64::from(active_units.max(1))
                * work_items_per_unit.max(1)
                * profile.work_item_scale(),
            iterations: profile.iterations(),
        }
    }

    /// Floating-point operations performed by one burst
    pub fn total_flops(&self) -> u64 {
        self.work_items * u64::from(self.iterations) * FLOPS_PER_ITERATION
    }
}

/// Clamp a requested unit count into `[1, max_units]`.
///
/// Absent or non-positive requests select every unit.
pub fn clamp_active_units(requested: Option<i64>, max_units: u32) -> u32 {
    let max_units = max_units.max(1);
    match requested {
        Some(units) if units > 0 => units.min(i64::from(max_units)) as u32,
        _ => max_units,
    }
}

/// Achieved throughput in GFLOP/s; zero when no time was measured.
pub fn throughput_gflops(work_items: u64, iterations: u32, elapsed_seconds: f64) -> f64 {
    if !(elapsed_seconds > 0.0) {
        return 0.0;
    }
    let total_flops = work_items as f64 * f64::from(iterations) * FLOPS_PER_ITERATION as f64;
    total_flops / 1e9 / elapsed_seconds
}

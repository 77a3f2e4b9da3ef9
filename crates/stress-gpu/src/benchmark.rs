//! One-shot throughput benchmark

use crate::controller::{RunPhase, RunState, Stressor};
use crate::kernel::{throughput_gflops, StressProfile};
use crate::{Result, StressError};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Timing of a single burn kernel dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Device-side execution time of the dispatch
    pub elapsed_seconds: f64,
    pub throughput_gflops: f64,
    pub work_items: u64,
    pub iterations: u32,
    pub profile: StressProfile,
    pub active_units: u32,
}

/// Puts the stressor back to idle when a benchmark ends, however it ends
struct BenchmarkGuard(Arc<RwLock<RunState>>);

impl Drop for BenchmarkGuard {
    fn drop(&mut self) {
        let mut state = self.0.write();
        if state.phase == RunPhase::Benchmarking {
            state.phase = RunPhase::Idle;
        }
    }
}

impl Stressor {
    /// Dispatch the kernel once and report achieved throughput.
    ///
    /// Rejected with [`StressError::DeviceBusy`] while a run or another
    /// benchmark holds the device.
    pub async fn benchmark_once(&self, profile: StressProfile, active_units: Option<i64>) -> Result<BenchmarkResult> {
        let (units, launch) = self.launch_for(profile, active_units);

        let _guard = {
            let mut state = self.state.write();
            if state.phase != RunPhase::Idle {
                return Err(StressError::DeviceBusy(format!(
                    "device is {:?}, benchmark rejected",
                    state.phase
                )));
            }
            state.phase = RunPhase::Benchmarking;
            BenchmarkGuard(Arc::clone(&self.state))
        };

        info!(
            device = %self.resolved.info.name,
            %profile,
            units,
            work_items = launch.work_items,
            iterations = launch.iterations,
            "Running benchmark"
        );

        let device = Arc::clone(&self.resolved.device);
        let timing = tokio::task::spawn_blocking(move || {
            let mut target = device.allocate(launch.work_items)?;
            target.dispatch(launch.iterations)
        })
        .await
        .map_err(|e| StressError::DispatchFailure(format!("benchmark task: {}", e)))??;

        let elapsed_seconds = timing.seconds();
        let throughput = throughput_gflops(launch.work_items, launch.iterations, elapsed_seconds);
        debug!(elapsed_seconds, throughput, "Benchmark dispatch timed");

        Ok(BenchmarkResult {
            elapsed_seconds,
            throughput_gflops: throughput,
            work_items: launch.work_items,
            iterations: launch.iterations,
            profile,
            active_units: units,
        })
    }
}

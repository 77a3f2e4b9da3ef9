//! One-shot benchmark

use crate::output::{OutputFormat, OutputFormatter};
use anyhow::Result;
use stress_gpu::{BenchmarkResult, StressProfile, Stressor};
use tracing::info;

/// Dispatch the kernel once and print the achieved throughput
pub async fn run_benchmark(
    stressor: &Stressor,
    profile: StressProfile,
    units: Option<i64>,
    output_format: OutputFormat,
) -> Result<BenchmarkResult> {
    let formatter = OutputFormatter::new(output_format);

    formatter.print_progress(&format!("Benchmarking {} ({})", stressor.device_info().name, profile));
    let result = stressor.benchmark_once(profile, units).await;
    formatter.clear_progress();

    let result = result?;
    info!("Benchmark: {:.2} GFLOP/s", result.throughput_gflops);
    formatter.print_item(&result)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use stress_gpu::mock::MockDevice;
    use stress_gpu::{DisabledProbe, KernelConfig};

    #[tokio::test]
    async fn test_benchmark_command() {
        let stressor = Stressor::with_parts(
            MockDevice::gpu("g", 2)
                .with_device_time(Duration::from_millis(2))
                .into_resolved(),
            Arc::new(DisabledProbe),
            KernelConfig { work_items_per_unit: 1024 },
        );

        let result = run_benchmark(&stressor, StressProfile::Light, Some(1), OutputFormat::Json)
            .await
            .unwrap();
        assert_eq!(result.work_items, 1024);
        assert!((result.throughput_gflops - 1024.0 * 50_000.0 * 4.0 / 1e9 / 0.002).abs() < 1e-6);
    }
}

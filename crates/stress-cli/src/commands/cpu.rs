//! CPU load through the external load program

use crate::commands::run::export_history;
use crate::output::{format_duration, format_reading, format_stats, Formattable, OutputFormat, OutputFormatter};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use stress_cpu::{CpuLoadConfig, CpuLoadProcess, CpuThermalSensor};
use stress_gpu::{summarize, RunHistory, Sample, Summary};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CpuArgs {
    pub duration_seconds: u64,
    /// Threads to load; all available when absent
    pub cores: Option<u32>,
    pub max_temperature: Option<f32>,
    pub refresh: Duration,
    /// Write the sample history to a .csv or .json file
    pub export: Option<PathBuf>,
}

/// Why the CPU load ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CpuStopReason {
    /// The program finished its duration and exited cleanly
    Completed,
    ThermalLimit { temperature: f32, limit: f32 },
    Stopped,
    /// The program exited unsuccessfully
    Exited { code: Option<i32> },
}

impl std::fmt::Display for CpuStopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CpuStopReason::Completed => write!(f, "time limit reached"),
            CpuStopReason::ThermalLimit { temperature, limit } => {
                write!(f, "temperature limit reached ({:.1}°C >= {:.1}°C)", temperature, limit)
            }
            CpuStopReason::Stopped => write!(f, "stopped on request"),
            CpuStopReason::Exited { code: Some(code) } => write!(f, "load program exited with {}", code),
            CpuStopReason::Exited { code: None } => write!(f, "load program killed by signal"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CpuReport {
    pub reason: CpuStopReason,
    pub threads: u32,
    pub elapsed_seconds: f64,
    /// Host temperature and CPU usage over the run
    pub summary: Summary,
    #[serde(skip)]
    pub history: RunHistory,
}

impl Formattable for CpuReport {
    fn table_headers() -> Vec<String> {
        [
            "Result",
            "Threads",
            "Elapsed",
            "Samples",
            "Temperature (min/avg/max)",
            "CPU Usage (min/avg/max)",
        ]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.reason.to_string(),
            self.threads.to_string(),
            format_duration(self.elapsed_seconds),
            self.summary.samples.to_string(),
            format_stats(&self.summary.temperature, "°C"),
            format_stats(&self.summary.utilization, "%"),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        Self::table_headers().into_iter().zip(self.table_row()).collect()
    }
}

/// Supervise the load program until it exits, overheats the host, or Ctrl-C.
pub async fn run_cpu_load(config: CpuLoadConfig, args: CpuArgs, output_format: OutputFormat) -> Result<CpuReport> {
    let formatter = OutputFormatter::new(output_format);

    let mut load = CpuLoadProcess::spawn(config, args.duration_seconds, args.cores.unwrap_or(u32::MAX))?;
    let mut sensor = CpuThermalSensor::new();
    if args.max_temperature.is_some() && !sensor.is_available() {
        formatter.print_warning("No thermal sensors found, temperature limit disabled")?;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let started = Instant::now();
    let mut history = RunHistory::new();

    let stop = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                formatter.clear_progress();
                warn!("Interrupted, stopping CPU load");
                break Some(CpuStopReason::Stopped);
            }
            _ = tokio::time::sleep(args.refresh) => {}
        }

        let temperature = sensor.max_temperature();
        let sample = Sample {
            elapsed_seconds: started.elapsed().as_secs_f64(),
            temperature: temperature.map(f64::from),
            utilization: sensor.cpu_usage().map(f64::from),
        };
        if !history.push(sample) {
            debug!(elapsed = sample.elapsed_seconds, "Dropped out-of-order sample");
        }

        if let (Some(t), Some(limit)) = (temperature, args.max_temperature) {
            if t >= limit {
                formatter.clear_progress();
                warn!("CPU temperature {:.1}°C reached limit {:.1}°C", t, limit);
                break Some(CpuStopReason::ThermalLimit { temperature: t, limit });
            }
        }

        if !load.is_running() {
            break None;
        }

        formatter.print_progress(&format!(
            "[{} / {}] {} thread(s), temperature {} usage {}",
            format_duration(load.elapsed().as_secs_f64()),
            format_duration(args.duration_seconds as f64),
            load.threads(),
            format_reading(sample.temperature, "°C"),
            format_reading(sample.utilization, "%"),
        ));
    };
    formatter.clear_progress();

    let reason = match stop {
        Some(reason) => {
            load.terminate().await?;
            reason
        }
        None => match load.exit_status() {
            Some(status) if status.success() => CpuStopReason::Completed,
            Some(status) => CpuStopReason::Exited { code: status.code() },
            None => CpuStopReason::Exited { code: None },
        },
    };
    info!("CPU load finished: {}", reason);

    let report = CpuReport {
        reason,
        threads: load.threads(),
        elapsed_seconds: load.elapsed().as_secs_f64(),
        summary: summarize(&history),
        history,
    };
    formatter.print_item(&report)?;

    if let Some(path) = &args.export {
        export_history(&report.history, path)?;
        formatter.print_success(&format!("History written to {}", path.display()))?;
    }
    Ok(report)
}

//! Guarded stress run with live progress

use crate::output::{
    colorize_reason, format_duration, format_reading, format_stats, Formattable, OutputFormat, OutputFormatter,
};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stress_gpu::{RunHistory, RunOutcome, RunRequest, StopReason, StressProfile, Stressor, Summary};
use tracing::{info, warn};

/// Parameters of the `run` command after defaults are applied
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub duration_seconds: f64,
    pub max_temperature: Option<i32>,
    pub units: Option<i64>,
    pub profile: StressProfile,
    pub refresh: Duration,
    pub export: Option<PathBuf>,
    /// Print every sample after the summary
    pub show_samples: bool,
}

/// What `run` reports once the loop has ended
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub device: String,
    pub outcome: RunOutcome,
    pub summary: Summary,
}

impl Formattable for RunReport {
    fn table_headers() -> Vec<String> {
        [
            "Device",
            "Result",
            "Started",
            "Profile",
            "Units",
            "Bursts",
            "Elapsed",
            "Samples",
            "Temperature (min/avg/max)",
            "Utilization (min/avg/max)",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.device.clone(),
            colorize_reason(&self.outcome.reason).to_string(),
            self.outcome.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            self.outcome.profile.to_string(),
            self.outcome.active_units.to_string(),
            self.outcome.bursts.to_string(),
            format_duration(self.outcome.elapsed_seconds),
            self.summary.samples.to_string(),
            format_stats(&self.summary.temperature, "°C"),
            format_stats(&self.summary.utilization, "%"),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        Self::table_headers().into_iter().zip(self.table_row()).collect()
    }
}

/// Run the stress loop until it ends or Ctrl-C, printing progress along the way.
pub async fn run_stress(stressor: &Stressor, args: RunArgs, output_format: OutputFormat) -> Result<RunReport> {
    let formatter = OutputFormatter::new(output_format);

    let mut request = RunRequest::new(args.duration_seconds).with_profile(args.profile);
    request.max_temperature = args.max_temperature;
    request.active_units = args.units;
    request.validate()?;

    if !stressor.start(request) {
        bail!("Device {} is busy", stressor.device_info().name);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    while stressor.is_running() {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                formatter.clear_progress();
                warn!("Interrupted, stopping after the current burst");
                stressor.stop();
            }
            _ = tokio::time::sleep(args.refresh) => {}
        }

        if stressor.is_running() {
            formatter.print_progress(&progress_line(stressor, args.duration_seconds));
        }
    }
    formatter.clear_progress();

    let outcome = stressor
        .wait()
        .await
        .ok_or_else(|| anyhow!("Stress run ended without an outcome"))?;
    info!("Run finished after {} burst(s): {}", outcome.bursts, outcome.reason);

    let report = RunReport {
        device: stressor.device_info().name.clone(),
        outcome,
        summary: stressor.summarize(),
    };
    formatter.print_item(&report)?;
    if args.show_samples {
        formatter.print_list(stressor.history().samples())?;
    }

    if let Some(path) = &args.export {
        export_history(&stressor.history(), path)?;
        formatter.print_success(&format!("History written to {}", path.display()))?;
    }

    if let StopReason::Failed { message } = &report.outcome.reason {
        bail!("Stress run failed: {}", message);
    }
    Ok(report)
}

fn progress_line(stressor: &Stressor, duration_seconds: f64) -> String {
    match stressor.latest_sample() {
        Some(sample) => format!(
            "[{} / {}] temperature {} utilization {}",
            format_duration(sample.elapsed_seconds),
            format_duration(duration_seconds),
            format_reading(sample.temperature, "°C"),
            format_reading(sample.utilization, "%"),
        ),
        None => "Waiting for the first burst...".to_string(),
    }
}

/// Write the history as JSON (`.json`) or CSV (anything else).
pub fn export_history(history: &RunHistory, path: &Path) -> Result<()> {
    let content = if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::to_string_pretty(history)?
    } else {
        history.to_csv()
    };
    std::fs::write(path, content).with_context(|| format!("Failed to write history: {}", path.display()))
}

//! Output formatting for stresslab

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use stress_gpu::{BenchmarkResult, DeviceInfo, Sample, Stats, StopReason};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Compact text format
    Text,
}

impl OutputFormat {
    /// Whether progress lines and colors belong on the terminal
    pub fn is_interactive(self) -> bool {
        matches!(self, OutputFormat::Table | OutputFormat::Text)
    }
}

/// Types that render as tables or key/value listings
pub trait Formattable {
    fn table_headers() -> Vec<String>;
    fn table_row(&self) -> Vec<String>;

    /// Format as key-value pairs for detailed view
    fn key_value_pairs(&self) -> Vec<(String, String)>;
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format and print a single item
    pub fn print_item<T>(&self, item: &T) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(item)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(item)?),
            OutputFormat::Table => {
                for (key, value) in item.key_value_pairs() {
                    println!("{}: {}", key.bold().cyan(), value);
                }
            }
            OutputFormat::Text => {
                for (key, value) in item.key_value_pairs() {
                    println!("{}: {}", key, value);
                }
            }
        }
        Ok(())
    }

    /// Format and print a list of items
    pub fn print_list<T>(&self, items: &[T]) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(items)?),
            OutputFormat::Table | OutputFormat::Text if items.is_empty() => {
                println!("{}", "No items found".dimmed());
            }
            OutputFormat::Table => println!("{}", render_table(items)),
            OutputFormat::Text => {
                println!("{}", T::table_headers().join("\t"));
                for item in items {
                    println!("{}", item.table_row().join("\t"));
                }
            }
        }
        Ok(())
    }

    pub fn print_success(&self, message: &str) -> Result<()> {
        self.print_status("success", message, || println!("{} {}", "✓".green().bold(), message.green()))
    }

    pub fn print_warning(&self, message: &str) -> Result<()> {
        self.print_status("warning", message, || {
            eprintln!("{} {}", "⚠".yellow().bold(), message.yellow())
        })
    }

    fn print_status(&self, status: &str, message: &str, interactive: impl FnOnce()) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let result = serde_json::json!({ "status": status, "message": message });
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Yaml => {
                println!("status: {}", status);
                println!("message: {}", message);
            }
            OutputFormat::Table | OutputFormat::Text => interactive(),
        }
        Ok(())
    }

    /// Overwrite the current progress line (interactive formats only)
    pub fn print_progress(&self, message: &str) {
        if self.format.is_interactive() {
            eprint!("\r{:<80}\r{}", "", message);
        }
    }

    pub fn clear_progress(&self) {
        if self.format.is_interactive() {
            eprint!("\r{}\r", " ".repeat(80));
        }
    }
}

fn render_table<T: Formattable>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header: Vec<Cell> = T::table_headers()
        .iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
        .collect();
    table.set_header(header);

    for item in items {
        table.add_row(item.table_row());
    }
    table
}

impl Formattable for DeviceInfo {
    fn table_headers() -> Vec<String> {
        ["Name", "Vendor", "Class", "Units", "Clock", "Memory"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.vendor.clone(),
            self.class.to_string(),
            self.parallel_unit_count.to_string(),
            format!("{} MHz", self.max_clock_mhz),
            format_bytes(self.memory_bytes),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        Self::table_headers().into_iter().zip(self.table_row()).collect()
    }
}

impl Formattable for BenchmarkResult {
    fn table_headers() -> Vec<String> {
        ["Profile", "Units", "Work Items", "Iterations", "Device Time", "Throughput"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.profile.to_string(),
            self.active_units.to_string(),
            self.work_items.to_string(),
            self.iterations.to_string(),
            format!("{:.3} ms", self.elapsed_seconds * 1000.0),
            format!("{:.2} GFLOP/s", self.throughput_gflops),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        Self::table_headers().into_iter().zip(self.table_row()).collect()
    }
}

impl Formattable for Sample {
    fn table_headers() -> Vec<String> {
        vec!["Elapsed".to_string(), "Temperature".to_string(), "Utilization".to_string()]
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            format!("{:.1}s", self.elapsed_seconds),
            format_reading(self.temperature, "°C"),
            format_reading(self.utilization, "%"),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        Self::table_headers().into_iter().zip(self.table_row()).collect()
    }
}

/// "min / avg / max" with a unit, or N/A when nothing was measured
pub fn format_stats(stats: &Stats, unit: &str) -> String {
    match (stats.min, stats.avg, stats.max) {
        (Some(min), Some(avg), Some(max)) => {
            format!("{:.1}{u} / {:.1}{u} / {:.1}{u}", min, avg, max, u = unit)
        }
        _ => "N/A".to_string(),
    }
}

pub fn format_reading(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.0}{}", v, unit))
}

/// Format a duration in seconds
pub fn format_duration(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    if whole < 60 {
        format!("{:.1}s", seconds.max(0.0))
    } else if whole < 3600 {
        format!("{}m {}s", whole / 60, whole % 60)
    } else {
        format!("{}h {}m", whole / 3600, (whole % 3600) / 60)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

pub fn colorize_reason(reason: &StopReason) -> ColoredString {
    let text = reason.to_string();
    match reason {
        StopReason::TimeLimit => text.green(),
        StopReason::Stopped => text.normal(),
        StopReason::ThermalLimit { .. } => text.yellow(),
        StopReason::Failed { .. } => text.red(),
    }
}

//! stresslab - thermally guarded GPU and CPU load generator

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use stress_gpu::{BackendKind, DeviceClass, StressConfig, StressProfile, Stressor};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod output;

use commands::cpu::CpuArgs;
use commands::run::RunArgs;
use config::CliConfig;
use output::OutputFormat;

const DEFAULT_LOG_FILTER: &str = "stresslab=info,stress_gpu=info,stress_cpu=info";

/// Thermally guarded load generator for GPUs and CPUs
#[derive(Debug, Parser)]
#[command(name = "stresslab")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Compute backend (auto, cuda, host, mock)
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Device class to bind to (gpu, cpu, accelerator)
    #[arg(short, long)]
    device_class: Option<DeviceClass>,

    /// Skip the external telemetry tool
    #[arg(long)]
    no_telemetry: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Enable JSON output (overrides --output)
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the selected compute device
    Info,

    /// Load the device until the duration or temperature limit is reached
    Run {
        /// Run length in seconds
        #[arg(short = 't', long)]
        duration: Option<f64>,

        /// Stop at this device temperature (°C)
        #[arg(short, long)]
        max_temp: Option<i32>,

        /// Disable the temperature limit
        #[arg(long, conflicts_with = "max_temp")]
        no_max_temp: bool,

        /// Parallel units to load (all when omitted or <= 0)
        #[arg(short, long, allow_negative_numbers = true)]
        units: Option<i64>,

        /// Intensity profile (light, medium, heavy)
        #[arg(short, long)]
        profile: Option<String>,

        /// Progress refresh interval in milliseconds
        #[arg(short, long)]
        refresh: Option<u64>,

        /// Write the sample history to a .csv or .json file
        #[arg(short, long, value_name = "FILE")]
        export: Option<PathBuf>,

        /// Print every sample after the summary
        #[arg(long)]
        samples: bool,
    },

    /// Measure kernel throughput with a single dispatch
    Bench {
        /// Intensity profile (light, medium, heavy)
        #[arg(short, long)]
        profile: Option<String>,

        /// Parallel units to load
        #[arg(short, long, allow_negative_numbers = true)]
        units: Option<i64>,
    },

    /// Load the host CPU through the external load program
    Cpu {
        /// Run length in seconds
        #[arg(short = 't', long)]
        duration: Option<u64>,

        /// Threads to start (all cores when omitted)
        #[arg(short = 'n', long)]
        cores: Option<u32>,

        /// Stop at this CPU temperature (°C)
        #[arg(short, long)]
        max_temp: Option<f32>,

        /// Load program path
        #[arg(short, long, value_name = "PATH")]
        executable: Option<PathBuf>,

        /// Write the sample history to a .csv or .json file
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new(DEFAULT_LOG_FILTER.replace("=info", "=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Starting stresslab with {:?}", cli);

    let config = CliConfig::load(cli.config.as_deref())?;
    debug!("Loaded configuration from {:?}", config.source());

    let output_format = if cli.json { OutputFormat::Json } else { cli.output };
    let overrides = cli.overrides();

    match cli.command {
        Commands::Info => {
            let stressor = build_stressor(&config, &overrides)?;
            commands::info::show_info(&stressor, output_format)?;
        }

        Commands::Run { duration, max_temp, no_max_temp, units, profile, refresh, export, samples } => {
            let stressor = build_stressor(&config, &overrides)?;
            let defaults = &config.defaults;
            let args = RunArgs {
                duration_seconds: duration.unwrap_or(defaults.duration_seconds),
                max_temperature: if no_max_temp { None } else { max_temp.or(defaults.max_temperature) },
                units,
                profile: profile.as_deref().map_or(defaults.profile, StressProfile::from_name),
                refresh: Duration::from_millis(refresh.unwrap_or(defaults.refresh_ms).max(1)),
                export,
                show_samples: samples,
            };
            commands::run::run_stress(&stressor, args, output_format).await?;
        }

        Commands::Bench { profile, units } => {
            let stressor = build_stressor(&config, &overrides)?;
            let profile = profile.as_deref().map_or(config.defaults.profile, StressProfile::from_name);
            commands::bench::run_benchmark(&stressor, profile, units, output_format).await?;
        }

        Commands::Cpu { duration, cores, max_temp, executable, export } => {
            let mut cpu_config = config.cpu.clone();
            if let Some(executable) = executable {
                cpu_config.executable = executable;
            }
            let args = CpuArgs {
                duration_seconds: duration.unwrap_or(config.defaults.duration_seconds.ceil() as u64),
                cores,
                max_temperature: max_temp.or(config.defaults.max_temperature.map(|t| t as f32)),
                refresh: Duration::from_millis(config.defaults.refresh_ms.max(1)),
                export,
            };
            commands::cpu::run_cpu_load(cpu_config, args, output_format).await?;
        }

        Commands::Config { action } => {
            commands::config::handle_config_command(&config, action, output_format)?;
        }
    }

    Ok(())
}

/// Flag values that override the configuration file
#[derive(Debug, Default, Clone)]
struct Overrides {
    backend: Option<BackendKind>,
    device_class: Option<DeviceClass>,
    no_telemetry: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            backend: self.backend,
            device_class: self.device_class,
            no_telemetry: self.no_telemetry,
        }
    }
}

fn stress_config(config: &CliConfig, overrides: &Overrides) -> StressConfig {
    let mut stress = config.gpu.clone();
    if let Some(backend) = overrides.backend {
        stress.backend = backend;
    }
    if let Some(class) = overrides.device_class {
        stress.device_class = class;
    }
    if overrides.no_telemetry {
        stress.telemetry.enabled = false;
    }
    stress
}

fn build_stressor(config: &CliConfig, overrides: &Overrides) -> Result<Stressor> {
    let stressor = Stressor::new(stress_config(config, overrides))?;
    info!(
        "Using {} ({} units) from platform {}",
        stressor.device_info().name,
        stressor.device_info().parallel_unit_count,
        stressor.platform()
    );
    Ok(stressor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert()
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["stresslab", "info"]).unwrap();
        assert!(matches!(cli.command, Commands::Info));

        let cli = Cli::try_parse_from([
            "stresslab", "--backend", "host", "run", "-t", "30", "--max-temp", "80", "--units", "-1", "--profile",
            "heavy",
        ])
        .unwrap();
        assert_eq!(cli.backend, Some(BackendKind::Host));
        match cli.command {
            Commands::Run { duration, max_temp, units, profile, .. } => {
                assert_eq!(duration, Some(30.0));
                assert_eq!(max_temp, Some(80));
                assert_eq!(units, Some(-1));
                assert_eq!(profile.as_deref(), Some("heavy"));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["stresslab", "config", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { action: ConfigCommands::Init { force: true } }));
    }

    #[test]
    fn test_conflicting_temperature_flags() {
        let result = Cli::try_parse_from(["stresslab", "run", "--max-temp", "80", "--no-max-temp"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_output_format() {
        let cli = Cli::try_parse_from(["stresslab", "--json", "info"]).unwrap();
        assert!(cli.json);

        let cli = Cli::try_parse_from(["stresslab", "--output", "yaml", "info"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Yaml);
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli = Cli::try_parse_from(["stresslab", "-b", "mock", "-d", "cpu", "--no-telemetry", "info"]).unwrap();
        let stress = stress_config(&CliConfig::default(), &cli.overrides());
        assert_eq!(stress.backend, BackendKind::Mock);
        assert_eq!(stress.device_class, DeviceClass::Cpu);
        assert!(!stress.telemetry.enabled);
    }

    #[test]
    fn test_build_stressor_with_mock_backend() {
        let overrides = Overrides {
            backend: Some(BackendKind::Mock),
            no_telemetry: true,
            ..Overrides::default()
        };
        let stressor = build_stressor(&CliConfig::default(), &overrides).unwrap();
        assert_eq!(stressor.platform(), "mock");

        let missing = Overrides {
            device_class: Some(DeviceClass::Accelerator),
            ..overrides
        };
        assert!(build_stressor(&CliConfig::default(), &missing).is_err());
    }
}

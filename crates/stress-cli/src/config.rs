//! Configuration file for stresslab

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stress_cpu::CpuLoadConfig;
use stress_gpu::{StressConfig, StressProfile};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Device, telemetry and kernel settings
    pub gpu: StressConfig,

    /// External CPU load program
    pub cpu: CpuLoadConfig,

    /// Defaults for `run` and `cpu` when flags are omitted
    pub defaults: RunDefaults,

    /// Configuration source path
    #[serde(skip)]
    source: Option<PathBuf>,
}

/// Fallback values for run parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    pub duration_seconds: f64,
    pub max_temperature: Option<i32>,
    pub profile: StressProfile,
    /// Progress refresh interval in milliseconds
    pub refresh_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            gpu: StressConfig::default(),
            cpu: CpuLoadConfig::default(),
            defaults: RunDefaults::default(),
            source: None,
        }
    }
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            duration_seconds: 60.0,
            max_temperature: Some(85),
            profile: StressProfile::Medium,
            refresh_ms: 500,
        }
    }
}

impl CliConfig {
    /// Load configuration from file or fall back to defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let mut config = Self::default();
            config.source = Some(config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        };

        config.source = Some(path.to_path_buf());
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to its source path
    pub fn save(&self) -> Result<()> {
        let path = self
            .source
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No config file path specified"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.gpu
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid gpu settings: {}", e))?;
        self.cpu
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid cpu settings: {}", e))?;
        if !(self.defaults.duration_seconds > 0.0) {
            anyhow::bail!("Default duration must be greater than zero");
        }
        if self.defaults.refresh_ms == 0 {
            anyhow::bail!("Refresh interval must be greater than zero");
        }
        Ok(())
    }

    /// Default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("stresslab").join("config.yaml"))
    }

    /// Configuration source path
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stress_gpu::BackendKind;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.gpu.backend, BackendKind::Auto);
        assert_eq!(config.defaults.max_temperature, Some(85));
        assert_eq!(config.defaults.profile, StressProfile::Medium);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_and_json_round_trip() {
        let temp_dir = TempDir::new().unwrap();

        for name in ["config.yaml", "config.json"] {
            let path = temp_dir.path().join("nested").join(name);
            let mut config = CliConfig::default().with_source(&path);
            config.gpu.backend = BackendKind::Host;
            config.defaults.duration_seconds = 12.5;
            config.save().unwrap();

            let loaded = CliConfig::load(Some(&path)).unwrap();
            assert_eq!(loaded.gpu.backend, BackendKind::Host);
            assert_eq!(loaded.defaults.duration_seconds, 12.5);
            assert_eq!(loaded.source(), Some(path.as_path()));
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "defaults:\n  profile: heavy\ngpu:\n  telemetry:\n    timeout: 750\n").unwrap();

        let config = CliConfig::load_from_file(&path).unwrap();
        assert_eq!(config.defaults.profile, StressProfile::Heavy);
        assert_eq!(config.defaults.refresh_ms, 500);
        assert_eq!(config.gpu.telemetry.timeout, std::time::Duration::from_millis(750));
        assert_eq!(config.gpu.telemetry.program, "nvidia-smi");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.yaml");
        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.source(), Some(path.as_path()));
        assert!(!path.exists());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "defaults:\n  refresh_ms: 0\n").unwrap();
        assert!(CliConfig::load_from_file(&path).is_err());

        std::fs::write(&path, "gpu: [not, a, map]\n").unwrap();
        assert!(CliConfig::load_from_file(&path).is_err());
    }
}

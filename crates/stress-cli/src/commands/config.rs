//! Configuration management commands

use crate::config::CliConfig;
use crate::output::{OutputFormat, OutputFormatter};
use crate::ConfigCommands;
use anyhow::{bail, Result};

/// Handle config commands
pub fn handle_config_command(config: &CliConfig, action: ConfigCommands, output_format: OutputFormat) -> Result<()> {
    let formatter = OutputFormatter::new(output_format);

    match action {
        ConfigCommands::Show => match output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            _ => print!("{}", serde_yaml::to_string(config)?),
        },
        ConfigCommands::Path => {
            let path = match config.source() {
                Some(path) => path.to_path_buf(),
                None => CliConfig::default_config_path()?,
            };
            println!("{}", path.display());
        }
        ConfigCommands::Init { force } => {
            let path = match config.source() {
                Some(path) => path.to_path_buf(),
                None => CliConfig::default_config_path()?,
            };
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            CliConfig::default().with_source(&path).save()?;
            formatter.print_success(&format!("Wrote default configuration to {}", path.display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stresslab").join("config.yaml");
        let config = CliConfig::load(Some(&path)).unwrap();

        handle_config_command(&config, ConfigCommands::Init { force: false }, OutputFormat::Text).unwrap();
        assert!(path.exists());
        assert!(handle_config_command(&config, ConfigCommands::Init { force: false }, OutputFormat::Text).is_err());
        assert!(handle_config_command(&config, ConfigCommands::Init { force: true }, OutputFormat::Text).is_ok());

        let loaded = CliConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.defaults, CliConfig::default().defaults);
    }
}

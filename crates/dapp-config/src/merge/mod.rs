//! Configuration layering: defaults, config file, command-line overrides

use camino::Utf8PathBuf;
use dapp_core::error::StoreError;
use std::collections::HashMap;
use tracing::debug;

use crate::toml::{load_from_file, validate_config, StoreConfig};
use crate::ConfigResult;

/// Main configuration loading interface
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Docker configuration directory, home default when unset
    config_dir: Option<Utf8PathBuf>,
    /// CLI flag overrides
    cli_overrides: HashMap<String, String>,
}

/// Configuration layering and merging
pub struct ConfigLayering;

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// No config file, built-in defaults
    Defaults,
    /// `<config-dir>/app/config.toml`
    File(Utf8PathBuf),
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit Docker configuration directory
    pub fn with_config_dir(mut self, config_dir: impl Into<Utf8PathBuf>) -> Self {
        self.config_dir = Some(config_dir.into());
        self
    }

    /// Add a command-line override (`log-level`, `overwrite-tags`, `store-dir`)
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.cli_overrides.insert(key.into(), value.into());
        self
    }

    /// The `~/.docker` directory
    pub fn default_config_dir() -> ConfigResult<Utf8PathBuf> {
        let home_dir = dirs::home_dir().ok_or_else(|| StoreError::ConfigValidation {
            field: "config-dir".to_string(),
            reason: "Could not determine home directory".to_string(),
        })?;

        let home_dir = Utf8PathBuf::try_from(home_dir).map_err(|e| StoreError::ConfigValidation {
            field: "config-dir".to_string(),
            reason: format!("Invalid home directory path: {}", e),
        })?;

        Ok(home_dir.join(".docker"))
    }

    /// Resolve the effective configuration
    pub fn load(&self) -> ConfigResult<(StoreConfig, ConfigSource)> {
        let config_dir = match &self.config_dir {
            Some(dir) => dir.clone(),
            None => Self::default_config_dir()?,
        };

        let defaults = StoreConfig::with_config_dir(config_dir.clone());
        let config_file = defaults.config_file();
        let (file_config, source) = if config_file.exists() {
            debug!("Loading configuration from {}", config_file);
            let mut loaded = load_from_file(&config_file)?;
            loaded.config_dir = config_dir;
            (loaded, ConfigSource::File(config_file))
        } else {
            (defaults, ConfigSource::Defaults)
        };

        let merged = ConfigLayering::merge_configs(file_config, &self.cli_overrides)?;
        Ok((merged, source))
    }
}

impl ConfigLayering {
    /// Apply CLI overrides on top of the file (or default) configuration
    pub fn merge_configs(
        base: StoreConfig,
        cli_overrides: &HashMap<String, String>,
    ) -> ConfigResult<StoreConfig> {
        let mut merged = base;
        Self::apply_cli_overrides(&mut merged, cli_overrides)?;
        validate_config(&merged)?;
        Ok(merged)
    }

    /// Apply CLI flag overrides
    fn apply_cli_overrides(
        config: &mut StoreConfig,
        overrides: &HashMap<String, String>,
    ) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "log-level" => {
                    config.log_level = value.clone();
                },
                "overwrite-tags" => {
                    config.overwrite_tags = value.parse().map_err(|_| StoreError::ConfigValidation {
                        field: "overwrite-tags".to_string(),
                        reason: format!("expected true or false, got '{}'", value),
                    })?;
                },
                "store-dir" => {
                    config.store_dir = Some(Utf8PathBuf::from(value));
                },
                other => {
                    debug!("Ignoring unknown configuration override '{}'", other);
                },
            }
        }

        Ok(())
    }
}

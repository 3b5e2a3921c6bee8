//! app/config.toml parsing and serialization

use camino::{Utf8Path, Utf8PathBuf};
use dapp_core::error::StoreError;
use serde::{Deserialize, Serialize};

use crate::{
    ConfigResult, APP_CONFIG_DIRECTORY, BUNDLE_STORE_DIRECTORY, CONFIG_FILE_NAME,
};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Application store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct StoreConfig {
    /// Docker configuration directory the app store lives in (~/.docker)
    #[serde(skip)]
    pub config_dir: Utf8PathBuf,

    /// Rebind an existing tag when storing under it
    ///
    /// When false, storing under a tag bound to other content fails.
    pub overwrite_tags: bool,

    /// Default log level for the CLI
    pub log_level: String,

    /// Explicit image store root, bypassing `<config-dir>/app/bundles`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<Utf8PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            config_dir: Utf8PathBuf::from(".docker"),
            overwrite_tags: true,
            log_level: "info".to_string(),
            store_dir: None,
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at a given Docker config directory
    pub fn with_config_dir(config_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            ..Self::default()
        }
    }

    /// `<config-dir>/app`
    pub fn app_dir(&self) -> Utf8PathBuf {
        self.config_dir.join(APP_CONFIG_DIRECTORY)
    }

    /// Root of the application image store
    pub fn image_store_dir(&self) -> Utf8PathBuf {
        match &self.store_dir {
            Some(dir) => dir.clone(),
            None => self.app_dir().join(BUNDLE_STORE_DIRECTORY),
        }
    }

    /// Location of the configuration file
    pub fn config_file(&self) -> Utf8PathBuf {
        self.app_dir().join(CONFIG_FILE_NAME)
    }
}

/// Parse config.toml content
pub fn parse_config(content: &str) -> ConfigResult<StoreConfig> {
    let config: StoreConfig = ::toml::from_str(content).map_err(|e| StoreError::ConfigParse {
        file: CONFIG_FILE_NAME.to_string(),
        message: e.to_string(),
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Serialize configuration back to TOML
pub fn serialize_config(config: &StoreConfig) -> ConfigResult<String> {
    ::toml::to_string_pretty(config).map_err(|e| StoreError::ConfigParse {
        file: CONFIG_FILE_NAME.to_string(),
        message: format!("TOML serialization error: {}", e),
    })
}

/// Validate configuration values
pub fn validate_config(config: &StoreConfig) -> ConfigResult<()> {
    if !LOG_LEVELS.contains(&config.log_level.as_str()) {
        return Err(StoreError::ConfigValidation {
            field: "log-level".to_string(),
            reason: format!(
                "'{}' is not one of {}",
                config.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if let Some(dir) = &config.store_dir {
        if dir.as_str().is_empty() {
            return Err(StoreError::ConfigValidation {
                field: "store-dir".to_string(),
                reason: "store directory cannot be empty".to_string(),
            });
        }
    }

    Ok(())
}

/// Load configuration from a file
pub fn load_from_file(path: &Utf8Path) -> ConfigResult<StoreConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| StoreError::io(format!("Failed to read {}", path), e))?;

    parse_config(&content).map_err(|e| match e {
        StoreError::ConfigParse { message, .. } => StoreError::ConfigParse {
            file: path.to_string(),
            message,
        },
        StoreError::ConfigValidation { field, reason } => StoreError::ConfigValidation {
            field,
            reason: format!("In file {}: {}", path, reason),
        },
        other => other,
    })
}

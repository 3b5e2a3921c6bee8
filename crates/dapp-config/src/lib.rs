//! Configuration loading for the dapp application image store
//!
//! This crate resolves where the application store lives on disk and which
//! behavioural switches are active, layering built-in defaults, the
//! `app/config.toml` file inside the Docker configuration directory, and
//! command-line overrides.

pub mod toml;
pub mod merge;

// Re-export main types
pub use self::toml::{StoreConfig, parse_config, serialize_config, validate_config, load_from_file};
pub use self::merge::{ConfigLoader, ConfigLayering, ConfigSource};

use dapp_core::error::StoreError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, StoreError>;

/// Docker App directory name inside the Docker config directory
pub const APP_CONFIG_DIRECTORY: &str = "app";
/// Application image store directory name
pub const BUNDLE_STORE_DIRECTORY: &str = "bundles";
/// Credential store directory name
pub const CREDENTIAL_STORE_DIRECTORY: &str = "credentials";
/// Installation store directory name
pub const INSTALLATION_STORE_DIRECTORY: &str = "installations";
/// Configuration file name inside the app directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

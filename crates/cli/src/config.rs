//! Configuration management for the SafeOpen tool.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/safeopen/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use opener::OpenPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commands::WriteOptions;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("allowed_root is not set (use --root, SAFEOPEN_ALLOWED_ROOT or [policy] allowed_root)")]
    MissingAllowedRoot,

    #[error("allowed_root must be an absolute path, got {0}")]
    RelativeAllowedRoot(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the SafeOpen tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General configuration.
    pub general: GeneralConfig,

    /// Open policy defaults.
    pub policy: PolicyConfig,
}

/// General configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Policy section. Mirrors [`OpenPolicy`], with the root optional so a
/// config file can leave it to the command line. There is no mode: each
/// command picks its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// Directory all opened files must stay inside.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_root: Option<PathBuf>,

    /// Resolve symlinks inside the root instead of rejecting them.
    pub follow_symlinks: bool,

    /// Create missing files on write.
    pub create_if_missing: bool,

    /// Truncate existing files on write.
    pub truncate: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl PolicyConfig {
    /// Build the read-only [`OpenPolicy`] this section describes.
    ///
    /// `truncate` only applies to `write` and is carried by
    /// [`PolicyConfig::write_options`] instead.
    pub fn to_policy(&self) -> Result<OpenPolicy, ConfigError> {
        let root = self
            .allowed_root
            .clone()
            .ok_or(ConfigError::MissingAllowedRoot)?;

        Ok(OpenPolicy::new(root)
            .follow_symlinks(self.follow_symlinks)
            .create_if_missing(self.create_if_missing))
    }

    /// Options for `write`, with the command-line flags added to this section.
    pub fn write_options(&self, create: bool, truncate: bool) -> WriteOptions {
        WriteOptions {
            create: create || self.create_if_missing,
            truncate: truncate || self.truncate,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("safeopen")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - SAFEOPEN_ALLOWED_ROOT: Override the allowed root directory
    /// - SAFEOPEN_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("SAFEOPEN_ALLOWED_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding allowed_root from environment: {}", root);
                self.policy.allowed_root = Some(PathBuf::from(root));
            }
        }

        if let Ok(level) = std::env::var("SAFEOPEN_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.general.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// The root must be set and absolute; whether it exists is checked when
    /// a file is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.general.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.general.log_level.clone()));
        }

        match &self.policy.allowed_root {
            None => return Err(ConfigError::MissingAllowedRoot),
            Some(root) if !root.is_absolute() => {
                return Err(ConfigError::RelativeAllowedRoot(
                    root.display().to_string(),
                ));
            }
            Some(_) => {}
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn config_with_root(root: &str) -> Config {
        let mut config = Config::default();
        config.policy.allowed_root = Some(PathBuf::from(root));
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.policy.allowed_root, None);
        assert!(!config.policy.follow_symlinks);
        assert!(!config.policy.create_if_missing);
        assert!(!config.policy.truncate);
    }

    #[test]
    fn test_from_toml_empty() {
        // Empty TOML should use all defaults
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[general]
log_level = "debug"

[policy]
allowed_root = "/srv/data"
follow_symlinks = true
create_if_missing = true
truncate = true
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.policy.allowed_root, Some(PathBuf::from("/srv/data")));
        assert!(config.policy.follow_symlinks);
        assert!(config.policy.create_if_missing);
        assert!(config.policy.truncate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[policy\nallowed_root = ");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML configuration"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[policy]
follow_symlinks = "yes"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_from_toml_wrong_root_type() {
        let toml = r#"
[policy]
allowed_root = 42
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut config = config_with_root("/srv/data");
        config.policy.create_if_missing = true;
        config.policy.truncate = true;

        let toml = config.to_toml().unwrap();
        assert!(toml.contains("truncate = true"));
        let restored = Config::from_toml(&toml).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_to_toml_without_root() {
        let toml = Config::default().to_toml().unwrap();
        assert!(!toml.contains("allowed_root"));
        assert_eq!(Config::from_toml(&toml).unwrap(), Config::default());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/config.toml");

        let config = config_with_root("/srv/data");
        config.save(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "not = [valid").unwrap();

        let err = format!("{:#}", Config::load(&path).unwrap_err());
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("safeopen/config.toml"));
    }

    #[test]
    fn test_to_policy() {
        let mut config = config_with_root("/srv/data");
        config.policy.follow_symlinks = true;

        let policy = config.policy.to_policy().unwrap();
        assert_eq!(
            policy,
            OpenPolicy::read_only("/srv/data").follow_symlinks(true)
        );
    }

    #[test]
    fn test_to_policy_without_root() {
        let config = Config::default();
        assert_eq!(
            config.policy.to_policy().unwrap_err(),
            ConfigError::MissingAllowedRoot
        );
    }

    #[test]
    fn test_validate_ok() {
        assert!(config_with_root("/srv/data").validate().is_ok());
    }

    #[test]
    fn test_validate_missing_root() {
        assert_eq!(
            Config::default().validate(),
            Err(ConfigError::MissingAllowedRoot)
        );
    }

    #[test]
    fn test_validate_relative_root() {
        assert_eq!(
            config_with_root("srv/data").validate(),
            Err(ConfigError::RelativeAllowedRoot("srv/data".to_string()))
        );
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = config_with_root("/srv/data");
        config.general.log_level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );

        config.general.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_truncate_only_affects_write() {
        let mut config = config_with_root("/srv/data");
        config.policy.truncate = true;
        assert!(config.validate().is_ok());

        let policy = config.policy.to_policy().unwrap();
        assert_eq!(policy, OpenPolicy::read_only("/srv/data"));
        assert!(policy.validate().is_ok());

        let options = config.policy.write_options(false, false);
        assert!(options.truncate);
        assert!(!options.create);
        assert!(config.policy.write_options(true, false).create);
    }

    #[test]
    #[serial]
    fn test_env_override_allowed_root() {
        std::env::set_var("SAFEOPEN_ALLOWED_ROOT", "/var/lib/reports");

        let mut config = config_with_root("/srv/data");
        config.apply_env_overrides();

        assert_eq!(
            config.policy.allowed_root,
            Some(PathBuf::from("/var/lib/reports"))
        );

        std::env::remove_var("SAFEOPEN_ALLOWED_ROOT");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("SAFEOPEN_ALLOWED_ROOT", "");
        std::env::set_var("SAFEOPEN_LOG_LEVEL", "");

        let mut config = config_with_root("/srv/data");
        config.apply_env_overrides();

        assert_eq!(config.policy.allowed_root, Some(PathBuf::from("/srv/data")));
        assert_eq!(config.general.log_level, "info");

        std::env::remove_var("SAFEOPEN_ALLOWED_ROOT");
        std::env::remove_var("SAFEOPEN_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::remove_var("SAFEOPEN_ALLOWED_ROOT");
        std::env::set_var("SAFEOPEN_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.policy.allowed_root, None);

        std::env::remove_var("SAFEOPEN_LOG_LEVEL");
    }
}

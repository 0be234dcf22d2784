//! # SafeOpen Command-Line Library
//!
//! This crate provides the `safeopen` tool: a thin shell around the
//! [`opener`] crate that reads its policy from a TOML configuration file,
//! environment variables and command-line flags.
//!
//! ## Overview
//!
//! - **Configuration**: TOML file loading, environment overrides, validation
//! - **Commands**: `cat`, `check` and `write` over a single safely opened file
//! - **Reporting**: one exit code per open failure kind
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use cli::{commands, Config};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let policy = config.policy.to_policy()?;
//!     commands::cat(&policy, Path::new("reports/q1.txt"), &mut std::io::stdout())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`commands`]: Command implementations and exit codes

pub mod commands;
pub mod config;

// Re-export opener for convenience
pub use opener;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export command types for convenience
pub use commands::{CommandError, WriteOptions};

//! SafeOpen
//!
//! Open files named by untrusted input, confined to an allowed root.

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cli::commands::{self, CommandError};
use cli::config::{default_config_path, Config, PolicyConfig};
use cli::opener::OpenPolicy;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

/// SafeOpen - open files confined to an allowed root directory.
#[derive(Parser, Debug)]
#[command(name = "safeopen")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Allowed root directory (overrides configuration)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Resolve symlinks inside the root instead of rejecting them
    #[arg(long, global = true)]
    pub follow_symlinks: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print a file to stdout
    Cat {
        /// Path, relative to the root or absolute inside it
        path: PathBuf,
    },

    /// Report whether a file can be opened
    Check {
        /// Path, relative to the root or absolute inside it
        path: PathBuf,
    },

    /// Write stdin to a file (appends unless --truncate)
    Write {
        /// Path, relative to the root or absolute inside it
        path: PathBuf,

        /// Create the file if it does not exist
        #[arg(long)]
        create: bool,

        /// Truncate the file before writing
        #[arg(long)]
        truncate: bool,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing before loading the configuration so its log lines
    // are kept; the level is narrowed once the configured one is known.
    // Logs go to stderr so `cat` output stays clean.
    let initial = if cli.verbose { "debug" } else { "info" };
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new(initial));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();

    if let Some(root) = &cli.root {
        config.policy.allowed_root = Some(std::path::absolute(root)?);
    }
    if cli.follow_symlinks {
        config.policy.follow_symlinks = true;
    }

    if !cli.verbose {
        filter_handle.reload(EnvFilter::new(config.general.log_level.to_lowercase()))?;
    }

    tracing::debug!("Using config file: {:?}", config_path);

    match cli.command {
        Commands::Config(ConfigCommands::Show) => {
            print!("{}", config.to_toml()?);
        }
        Commands::Config(ConfigCommands::Init { force }) => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            config.save(&config_path)?;
            tracing::info!("Wrote configuration to {:?}", config_path);
        }
        command => {
            config.validate()?;
            let policy = config.policy.to_policy()?;
            tracing::debug!("Open policy: {:?}", policy);

            if let Err(err) = run_open_command(command, &policy, &config.policy) {
                tracing::warn!("{}", err);
                eprintln!("Error: {}", err);
                std::process::exit(err.exit_code());
            }
        }
    }

    Ok(())
}

/// Run one of the commands that open a file.
fn run_open_command(
    command: Commands,
    policy: &OpenPolicy,
    section: &PolicyConfig,
) -> Result<(), CommandError> {
    match command {
        Commands::Cat { path } => {
            commands::cat(policy, &path, &mut io::stdout().lock())?;
        }
        Commands::Check { path } => {
            let result = commands::check(policy, &path);
            println!("{}", commands::check_report(&result));
            result?;
        }
        Commands::Write {
            path,
            create,
            truncate,
        } => {
            let options = section.write_options(create, truncate);
            let written = commands::write(policy, &path, options, &mut io::stdin().lock())?;
            tracing::info!("Wrote {} bytes to {:?}", written, path);
        }
        Commands::Config(_) => unreachable!("config commands open no file"),
    }
    Ok(())
}

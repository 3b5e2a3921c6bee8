//! # dapp-cli
//!
//! Command-line access to the local application image store.
//!
//! This is the main entry point for the `dapp` tool. It handles command parsing,
//! loads configuration, sets up logging and dispatches to the image commands.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use dapp_config::ConfigLoader;
use dapp_core::error::StoreResult;
use std::process::ExitCode;
use tracing::{debug, error};

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Manage CNAB application images stored locally
#[derive(Parser)]
#[command(name = "dapp", version, about = "Local application image store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Docker configuration directory
    #[arg(long, global = true, env = "DOCKER_CONFIG", value_name = "DIR")]
    pub config: Option<Utf8PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage application images
    Image {
        #[command(subcommand)]
        command: ImageCommands,
    },
}

#[derive(Subcommand)]
pub enum ImageCommands {
    /// List application images
    #[command(alias = "list")]
    Ls {
        /// Only show image IDs
        #[arg(short, long)]
        quiet: bool,
        /// Show digests
        #[arg(long)]
        digests: bool,
    },
    /// Remove one or more application images
    #[command(alias = "remove")]
    Rm {
        /// Remove every reference to an image given by ID
        #[arg(short, long)]
        force: bool,
        #[arg(required = true, value_name = "APP_IMAGE")]
        images: Vec<String>,
    },
    /// Create a tag TARGET that refers to SOURCE
    Tag {
        source: String,
        target: String,
    },
    /// Display an application image's bundle and relocation data
    Inspect {
        #[arg(value_name = "APP_IMAGE")]
        image: String,
    },
    /// Store a bundle file as an application image
    Import {
        /// Path to a bundle.json document
        file: Utf8PathBuf,
        /// Reference to bind to the stored image
        #[arg(short, long)]
        tag: Option<String>,
        /// Relocation map to store alongside the bundle
        #[arg(long, value_name = "FILE")]
        relocation_map: Option<Utf8PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_panic_handler();

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", ErrorFormatter::new().format_error(&e));
            ExitCode::FAILURE
        },
    }
}

fn run_cli(cli: Cli) -> StoreResult<()> {
    let mut loader = ConfigLoader::new();
    if let Some(dir) = cli.config {
        loader = loader.with_config_dir(dir);
    }
    if cli.verbose {
        loader = loader.with_override("log-level", "debug");
    }
    let (config, source) = loader.load()?;

    setup_logging(&config.log_level);
    debug!("Starting dapp v{} with configuration from {:?}", env!("CARGO_PKG_VERSION"), source);

    let ctx = CommandContext::new(config)?;
    commands::dispatch_command(cli.command, &ctx)
}

fn setup_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "dapp={},dapp_store={},dapp_config={}",
            level, level, level
        ))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("dapp encountered an unexpected error: {}", panic_info);
        eprintln!("dapp crashed! This is a bug.");
        eprintln!("Error: {}", panic_info);
    }));
}

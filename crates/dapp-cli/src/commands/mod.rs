//! Command implementations and dispatch logic.
//!
//! Each `dapp image` subcommand lives in its own module and takes a
//! [`CommandContext`].

use dapp_config::StoreConfig;
use dapp_core::error::StoreResult;
use dapp_store::{AppStore, ImageStore};
use tracing::{debug, info};

pub mod import;
pub mod inspect;
pub mod ls;
pub mod rm;
pub mod tag;


use crate::{output::OutputHandler, Commands, ImageCommands};

/// Shared context for all commands
pub struct CommandContext {
    pub config: StoreConfig,
    pub app_store: AppStore,
    pub output: OutputHandler,
}

impl CommandContext {
    /// Create a new command context, initializing the application store
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let app_store = AppStore::new(&config)?;
        let output = OutputHandler::new();

        Ok(Self {
            config,
            app_store,
            output,
        })
    }

    /// Open the image store
    pub fn image_store(&self) -> StoreResult<ImageStore> {
        debug!(
            "Opening image store at {} (overwrite tags: {})",
            self.config.image_store_dir(),
            self.config.overwrite_tags
        );
        self.app_store.image_store()
    }
}

/// Dispatch a command to its handler
pub fn dispatch_command(command: Commands, ctx: &CommandContext) -> StoreResult<()> {
    match command {
        Commands::Image { command } => dispatch_image_command(command, ctx),
    }
}

fn dispatch_image_command(command: ImageCommands, ctx: &CommandContext) -> StoreResult<()> {
    match command {
        ImageCommands::Ls { quiet, digests } => {
            info!("Listing application images (quiet: {}, digests: {})", quiet, digests);
            ls::execute(quiet, digests, ctx)
        },
        ImageCommands::Rm { force, images } => {
            info!("Removing application images: {:?} (force: {})", images, force);
            rm::execute(&images, force, ctx)
        },
        ImageCommands::Tag { source, target } => {
            info!("Tagging {} as {}", source, target);
            tag::execute(&source, &target, ctx)
        },
        ImageCommands::Inspect { image } => {
            info!("Inspecting {}", image);
            inspect::execute(&image, ctx)
        },
        ImageCommands::Import {
            file,
            tag,
            relocation_map,
        } => {
            info!("Importing {}", file);
            import::execute(&file, tag.as_deref(), relocation_map.as_deref(), ctx)
        },
    }
}

//! `dapp image tag` command implementation.

use dapp_core::error::StoreResult;
use dapp_core::types::Reference;
use tracing::debug;

use super::CommandContext;

/// Execute the `dapp image tag` command
pub fn execute(source: &str, target: &str, ctx: &CommandContext) -> StoreResult<()> {
    let store = ctx.image_store()?;
    let source = store.look_up(source)?;
    let target = Reference::parse_named(target)?;

    let id = store.tag(&source, &target)?;
    debug!("Tagged {} as {}", id, target);
    Ok(())
}

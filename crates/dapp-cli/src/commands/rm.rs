//! `dapp image rm` command implementation.
//!
//! Removes each named application image in turn. A failure does not stop
//! the remaining removals; all failures are reported together.

use dapp_core::error::{StoreError, StoreResult};
use dapp_store::ImageStore;

use super::CommandContext;

/// Execute the `dapp image rm` command
pub fn execute(images: &[String], force: bool, ctx: &CommandContext) -> StoreResult<()> {
    let store = ctx.image_store()?;
    let mut failures = Vec::new();

    for image in images {
        match remove_one(&store, image, force) {
            Ok(removed) => ctx.output.print(&format!("Deleted: {}", removed)),
            Err(e) => failures.push(e),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(StoreError::RemovalFailed { failures })
    }
}

/// Remove one image, returning its familiar name
pub fn remove_one(store: &ImageStore, image: &str, force: bool) -> StoreResult<String> {
    let reference = store.look_up(image)?;
    store.remove(&reference, force)?;
    Ok(reference.familiar())
}

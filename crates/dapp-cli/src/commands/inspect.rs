//! `dapp image inspect` command implementation.
//!
//! Prints the stored bundle together with its ID, references and
//! relocation data as pretty JSON.

use dapp_core::error::{StoreError, StoreResult};
use dapp_store::ImageStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use super::CommandContext;

/// Inspection output
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescription {
    pub id: String,
    /// Stored bundle still hashes to the ID
    pub verified: bool,
    pub references: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_digest: Option<String>,
    pub bundle: Value,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relocation_map: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relocated_images: BTreeMap<String, Value>,
}

/// Execute the `dapp image inspect` command
pub fn execute(image: &str, ctx: &CommandContext) -> StoreResult<()> {
    let store = ctx.image_store()?;
    let description = describe(&store, image)?;
    let json = serde_json::to_string_pretty(&description)
        .map_err(|e| StoreError::serialization("Failed to format inspection output", e))?;
    ctx.output.print(&json);
    Ok(())
}

/// Resolve an image and gather everything stored about it
pub fn describe(store: &ImageStore, image: &str) -> StoreResult<ImageDescription> {
    let reference = store.look_up(image)?;
    let id = store.resolve_id(&reference)?;
    let stored = store.read(&reference)?;
    let verified = store.contents().verify(&id)?;
    if !verified {
        warn!("Content of {} no longer matches its ID", id);
    }

    Ok(ImageDescription {
        id: id.to_string(),
        verified,
        references: store
            .index()
            .references(&id)
            .iter()
            .map(|r| r.familiar())
            .collect(),
        repo_digest: stored.repo_digest().map(ToString::to_string),
        relocated_images: stored.relocated_images(),
        relocation_map: stored.relocation_map().clone(),
        bundle: stored.bundle().as_value().clone(),
    })
}

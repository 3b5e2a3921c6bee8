//! `dapp image import` command implementation.
//!
//! Reads a bundle document, and optionally a relocation map, from disk and
//! stores them as an application image.

use camino::Utf8Path;
use dapp_core::error::{StoreError, StoreResult};
use dapp_core::types::{AppImage, Bundle, ImageId, Reference, RelocationMap};
use dapp_store::ImageStore;
use std::fs;

use super::CommandContext;

/// Execute the `dapp image import` command
pub fn execute(
    file: &Utf8Path,
    tag: Option<&str>,
    relocation_map: Option<&Utf8Path>,
    ctx: &CommandContext,
) -> StoreResult<()> {
    let store = ctx.image_store()?;
    let id = import(&store, file, tag, relocation_map)?;
    ctx.output.success(&format!("Imported {}", file));
    ctx.output.print(&id.to_string());
    Ok(())
}

/// Store the files as an image, returning its ID
pub fn import(
    store: &ImageStore,
    file: &Utf8Path,
    tag: Option<&str>,
    relocation_map: Option<&Utf8Path>,
) -> StoreResult<ImageId> {
    let reference = tag.map(Reference::parse_named).transpose()?;

    let bytes = fs::read(file).map_err(|e| StoreError::io(format!("Failed to read {}", file), e))?;
    let mut image = AppImage::from_bundle(Bundle::from_slice(&bytes)?);

    if let Some(path) = relocation_map {
        let bytes = fs::read(path).map_err(|e| StoreError::io(format!("Failed to read {}", path), e))?;
        let map: RelocationMap = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::serialization(format!("Failed to decode relocation map {}", path), e))?;
        image = image.with_relocation_map(map);
    }

    store.store(&image, reference.as_ref())
}

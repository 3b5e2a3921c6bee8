//! Content-Addressable Storage for application images
//!
//! This crate stores CNAB bundles, with their relocation maps, under IDs
//! derived from their content and keeps a persistent index of the tags and
//! digests pointing at them. Several references may share one piece of
//! content; removing the last reference removes the content.

pub mod app;
pub mod cas;
pub mod image;

// Re-export main types
pub use app::AppStore;
pub use cas::{compute_id, ContentStore, ReferenceIndex};
pub use image::ImageStore;

use dapp_core::error::StoreError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

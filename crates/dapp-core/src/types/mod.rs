//! Core data types for the application image store.
//!
//! This module provides the fundamental types shared by every crate:
//! - Digests and content IDs
//! - Tagged, digested and bare-ID references
//! - The application image payload (bundle plus relocation map)

pub mod digest;
pub mod image;
pub mod reference;

// Re-export all public types
pub use digest::{Algorithm, Digest, ImageId, SHORT_ID_LEN};
pub use image::{AppImage, Bundle, RelocationMap};
pub use reference::{DigestedRef, Reference, RepositoryName, TaggedRef, DEFAULT_DOMAIN, DEFAULT_TAG};

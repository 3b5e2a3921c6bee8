//! Content-Addressable Storage implementation
//!
//! This module provides the building blocks of the image store: ID
//! computation, the on-disk content area and the reference index.

pub mod content;
pub mod hash;
pub mod index;

// Re-export main types
pub use content::ContentStore;
pub use hash::compute_id;
pub use index::ReferenceIndex;

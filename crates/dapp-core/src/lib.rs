//! # dapp-core
//!
//! Core types and utilities shared across all dapp crates.
//!
//! This crate provides:
//! - Digest, ImageId and Reference value types with normalization
//! - The AppImage payload stored by the application image store
//! - StoreError enum for unified error handling
//! - Hashing helpers
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (ImageId, Reference, AppImage, etc.)
//! - `error`: Error types and result aliases
//! - `utils`: Utility functions and helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{StoreError, StoreResult};
pub use types::{AppImage, Bundle, Digest, DigestedRef, ImageId, Reference, RelocationMap, RepositoryName, TaggedRef};

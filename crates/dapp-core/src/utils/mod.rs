//! Utility functions and helpers.
//!
//! Common functionality used across multiple dapp crates.

pub mod hash;

// Re-export commonly used utilities
pub use hash::{digest_of, sha256_digest, verify_digest};

//! SHA-2 hashing utilities for content addressing.
//!
//! Provides the digest functions used to derive content IDs and to check
//! caller-supplied digests against bytes.

use sha2::{Digest as _, Sha256, Sha384, Sha512};

use crate::types::{Algorithm, Digest};

/// Compute the SHA-256 digest of data
pub fn sha256_digest(data: &[u8]) -> Digest {
    digest_of(Algorithm::Sha256, data)
}

/// Compute the digest of data with the given algorithm
pub fn digest_of(algorithm: Algorithm, data: &[u8]) -> Digest {
    let encoded = match algorithm {
        Algorithm::Sha256 => hex::encode(Sha256::digest(data)),
        Algorithm::Sha384 => hex::encode(Sha384::digest(data)),
        Algorithm::Sha512 => hex::encode(Sha512::digest(data)),
    };
    Digest::from_hash_output(algorithm, encoded)
}

/// Verify data against an expected digest
pub fn verify_digest(data: &[u8], expected: &Digest) -> bool {
    digest_of(expected.algorithm(), data) == *expected
}

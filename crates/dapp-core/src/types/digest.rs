//! Content digests and application image IDs.
//!
//! A [`Digest`] is an `algorithm:hex` pair as found in digest references.
//! An [`ImageId`] is the canonical content address of a stored application
//! image: always a SHA-256 digest, displayed as bare hex.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{StoreError, StoreResult};

/// Number of hex characters shown for a truncated ID
pub const SHORT_ID_LEN: usize = 12;

/// Digest algorithms accepted in digest references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    /// Canonical lowercase name, also used as the content directory name
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex encoding of a digest of this algorithm
    pub fn encoded_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
            Algorithm::Sha384 => 96,
            Algorithm::Sha512 => 128,
        }
    }

    /// Look up an algorithm by name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Algorithm::Sha256),
            "sha384" => Some(Algorithm::Sha384),
            "sha512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that a string is lowercase hex
pub fn is_lower_hex(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// A validated `algorithm:hex` digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: Algorithm,
    encoded: String,
}

impl Digest {
    /// Create a digest from an algorithm and its hex encoding
    pub fn new(algorithm: Algorithm, encoded: impl Into<String>) -> StoreResult<Self> {
        let encoded = encoded.into();
        if encoded.len() != algorithm.encoded_len() || !is_lower_hex(&encoded) {
            return Err(StoreError::InvalidReference {
                value: format!("{}:{}", algorithm, encoded),
                reason: format!(
                    "{} digest must be {} lowercase hex characters",
                    algorithm,
                    algorithm.encoded_len()
                ),
            });
        }
        Ok(Self { algorithm, encoded })
    }

    /// Wrap hex produced by a local hasher
    pub(crate) fn from_hash_output(algorithm: Algorithm, encoded: String) -> Self {
        Self { algorithm, encoded }
    }

    /// Parse an `algorithm:hex` string
    pub fn parse(value: &str) -> StoreResult<Self> {
        let (name, encoded) = value.split_once(':').ok_or_else(|| StoreError::InvalidReference {
            value: value.to_string(),
            reason: "digest must have the form <algorithm>:<hex>".to_string(),
        })?;
        let algorithm = Algorithm::from_name(name).ok_or_else(|| StoreError::InvalidReference {
            value: value.to_string(),
            reason: format!("unsupported digest algorithm '{}'", name),
        })?;
        Self::new(algorithm, encoded)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex part of the digest
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

/// Canonical content address of an application image
///
/// Displayed as the bare hex encoding, the same form `ls` prints and
/// `look_up` accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageId {
    digest: Digest,
}

impl ImageId {
    /// Wrap a SHA-256 digest as an image ID
    pub fn from_digest(digest: Digest) -> StoreResult<Self> {
        if digest.algorithm() != Algorithm::Sha256 {
            return Err(StoreError::InvalidIdFormat {
                value: digest.to_string(),
            });
        }
        Ok(Self { digest })
    }

    /// Parse a full ID, with or without the `sha256:` prefix
    pub fn parse(value: &str) -> StoreResult<Self> {
        let encoded = value.strip_prefix("sha256:").unwrap_or(value);
        if encoded.len() != Algorithm::Sha256.encoded_len() || !is_lower_hex(encoded) {
            return Err(StoreError::InvalidIdFormat {
                value: value.to_string(),
            });
        }
        Ok(Self {
            digest: Digest {
                algorithm: Algorithm::Sha256,
                encoded: encoded.to_string(),
            },
        })
    }

    /// Whether a string can only be a truncated ID prefix
    pub fn is_short_id(value: &str) -> bool {
        value.len() < Algorithm::Sha256.encoded_len() && is_lower_hex(value)
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Full hex encoding
    pub fn encoded(&self) -> &str {
        self.digest.encoded()
    }

    /// Truncated hex form for display
    pub fn short(&self) -> &str {
        &self.digest.encoded()[..SHORT_ID_LEN]
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.digest.encoded())
    }
}

impl FromStr for ImageId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageId> for String {
    fn from(id: ImageId) -> Self {
        id.to_string()
    }
}

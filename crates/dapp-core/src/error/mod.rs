//! Error types and result aliases for application image store operations.
//!
//! Every failure the store can report is a variant of [`StoreError`]. Nothing
//! at this layer is transient, so no variant is ever retried internally.

use thiserror::Error;

/// Unified error type for all store operations
#[derive(Error, Debug)]
pub enum StoreError {
    // Parsing errors
    #[error("could not parse '{value}' as a valid content ID")]
    InvalidIdFormat { value: String },

    #[error("could not parse '{value}' as a valid reference: {reason}")]
    InvalidReference { value: String, reason: String },

    // Content errors
    #[error("content {id} is missing from the store")]
    ContentMissing { id: String },

    #[error("content at {path} is corrupt: {message}")]
    CorruptContent {
        path: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Reference index errors
    #[error("reference does not exist")]
    ReferenceNotFound { reference: String },

    #[error("{reference}: reference not found")]
    UnknownReference { reference: String },

    #[error("tag {reference} is already bound to {existing}")]
    TagConflict { reference: String, existing: String },

    #[error("digest reference {reference} is already bound to {existing}")]
    DigestConflict { reference: String, existing: String },

    // Resolution errors
    #[error("ambiguous reference found: {short_id} matches {matches} stored IDs")]
    AmbiguousReference { short_id: String, matches: usize },

    #[error("unable to delete \"{reference}\" - App is referenced in multiple repositories")]
    AmbiguousRemoval { reference: String },

    #[error("{} error(s) occurred while removing references:\n{}", .failures.len(), join_failures(.failures))]
    RemovalFailed { failures: Vec<StoreError> },

    // Config errors
    #[error("Failed to parse {file}: {message}")]
    ConfigParse { file: String, message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

fn join_failures(failures: &[StoreError]) -> String {
    failures
        .iter()
        .map(|failure| format!("\t* {}", failure))
        .collect::<Vec<_>>()
        .join("\n")
}

impl StoreError {
    /// Create an IO error from std::io::Error
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a serialization error from serde_json::Error
    pub fn serialization(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            message: message.into(),
            source,
        }
    }

    /// Wrap a missing reference into the user-facing variant
    pub fn unknown_reference(reference: impl Into<String>) -> Self {
        Self::UnknownReference {
            reference: reference.into(),
        }
    }

    /// Check if this error means the requested thing does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ContentMissing { .. }
                | StoreError::ReferenceNotFound { .. }
                | StoreError::UnknownReference { .. }
        )
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::UnknownReference { .. } | StoreError::ReferenceNotFound { .. } => {
                Some("Run 'dapp image ls' to see the application images available locally")
            },
            StoreError::AmbiguousReference { .. } => {
                Some("Use a longer ID prefix or the full application image ID")
            },
            StoreError::AmbiguousRemoval { .. } => {
                Some("Remove the tags one by one, or pass --force to remove all of them")
            },
            StoreError::TagConflict { .. } => {
                Some("Enable tag overwrite in the configuration or pick another tag")
            },
            StoreError::CorruptContent { .. } => {
                Some("Remove the application image by ID and build or pull it again")
            },
            _ => None,
        }
    }
}

//! Error types for Libris.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Extraction failed for {path}: {reason}")]
    Extraction { path: String, reason: String },

    #[error("Could not decode {0} with any supported encoding")]
    Decode(String),

    /// The normalization map is absent and non-plain-text input needs it.
    #[error("Normalization map missing: {0}. Run with --rebuild to generate it.")]
    MissingRuleSet(String),

    #[error("Normalization rule error: {0}")]
    Rule(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn extraction(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Extraction {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors that must abort a whole indexing run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::MissingRuleSet(_) | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

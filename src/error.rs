//! Error types for sro-core.

use thiserror::Error;

/// Result type alias using sro-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during research-session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Fact store operation failed
    #[error("Fact store error: {0}")]
    Storage(String),

    /// Fact store file is unreadable or structurally damaged; fatal to the session
    #[error("Fact store corrupted: {0}")]
    Corruption(String),

    /// Caller supplied an invalid value (confidence range, tier name, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Insert with an id that already exists
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// Generator/provider error
    #[error("Generation error: {provider} - {message}")]
    Generation { provider: String, message: String },

    /// No registered provider can serve a capability/quality pair
    #[error("No provider supports capability={capability}, quality={quality}")]
    NoProvider { capability: String, quality: String },

    /// Timeout during a generator call
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token budget exhausted
    #[error("Budget exhausted: {resource}")]
    BudgetExhausted { resource: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a generation error.
    pub fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a budget exhausted error.
    pub fn budget_exhausted(resource: impl Into<String>) -> Self {
        Self::BudgetExhausted {
            resource: resource.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == rusqlite::ErrorCode::DatabaseCorrupt
                    || err.code == rusqlite::ErrorCode::NotADatabase =>
            {
                Self::Corruption(e.to_string())
            }
            _ => Self::Storage(e.to_string()),
        }
    }
}

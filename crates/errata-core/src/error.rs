//! Error types for Errata

use thiserror::Error;

/// Result type alias using Errata's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errata error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Catalog errors (E001-E099)
    #[error("Error code {0} is already registered. Run `errata list --code {0}` to inspect it.")]
    DuplicateCode(i64),

    #[error("Error code entry {0} not found. Run `errata list` to see the catalog.")]
    NotFound(i64),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateCode(_) => "E001",
            Self::NotFound(_) => "E002",
            Self::Database(_) => "E400",
            Self::InvalidInput(_) => "E800",
            Self::Parse(_) => "E801",
            Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::DuplicateCode(code) => Some(format!("errata list --code {}", code)),
            Self::NotFound(_) => Some("errata list".to_string()),
            _ => None,
        }
    }
}

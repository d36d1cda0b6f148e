//! Errata Core Library
//!
//! This crate provides the core functionality for Errata, including:
//! - Error code catalog (manual CRUD, pagination, change feeds)
//! - Batch reconciliation of auto-generated error codes
//! - Storage (SQLite connection pooling + migrations)
//! - Configuration management

pub mod catalog;
pub mod config;
pub mod error;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{
        DeclaredErrorCode, ErrorCode, ErrorCodeDraft, ErrorCodeKind, ErrorCodeRepository,
        ErrorCodeService,
    };
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
}

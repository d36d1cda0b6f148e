//! Error code catalog
//!
//! Manual CRUD management and batch reconciliation for error code records.
//!
//! # Architecture
//!
//! - `model`: entity, provenance kind, DTOs and filters
//! - `repository`: SQLite persistence for the catalog
//! - `service`: business rules (duplicate checks, reconciliation gating)

pub mod model;
pub mod repository;
pub mod service;

// Re-export commonly used types
pub use model::{
    DeclaredErrorCode, ErrorCode, ErrorCodeDraft, ErrorCodeFilter, ErrorCodeKind,
    ErrorCodeSnapshot, Page, PageRequest,
};
pub use repository::ErrorCodeRepository;
pub use service::{require_error_code, validate_code_available, ErrorCodeService};

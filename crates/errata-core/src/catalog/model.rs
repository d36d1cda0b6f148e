//! Error code catalog types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance of a catalog record
///
/// Reconciliation only ever mutates `AutoGenerated` records; `Manual`
/// records belong to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCodeKind {
    /// Created or last edited by an operator
    Manual,
    /// Produced by batch reconciliation
    AutoGenerated,
}

impl ErrorCodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::AutoGenerated => "auto_generated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "auto_generated" => Some(Self::AutoGenerated),
            _ => None,
        }
    }
}

/// A persisted error code record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorCode {
    /// Store-assigned identifier
    pub id: i64,
    /// Numeric code, unique across the whole catalog
    pub code: i64,
    /// Owning application/service
    pub application_name: String,
    /// Human-readable message template
    pub message: String,
    pub kind: ErrorCodeKind,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// One externally-declared error code in a reconciliation batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredErrorCode {
    pub code: i64,
    pub application_name: String,
    pub message: String,
}

/// Input for the manual create/update operations
#[derive(Debug, Clone, Default)]
pub struct ErrorCodeDraft {
    pub code: i64,
    pub application_name: String,
    pub message: String,
}

/// Filter for list/page queries
#[derive(Debug, Clone, Default)]
pub struct ErrorCodeFilter {
    /// Exact code match
    pub code: Option<i64>,
    /// Application name substring match
    pub application_name: Option<String>,
    pub kind: Option<ErrorCodeKind>,
}

/// A page request (1-based page numbering)
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

/// One page of results plus the total row count
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

/// External-facing shape for incremental error code pulls
///
/// Returned by the changed-since query so applications can refresh their
/// local error message caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCodeSnapshot {
    pub code: i64,
    pub message: String,
    pub update_time: DateTime<Utc>,
}

impl From<ErrorCode> for ErrorCodeSnapshot {
    fn from(record: ErrorCode) -> Self {
        Self {
            code: record.code,
            message: record.message,
            update_time: record.update_time,
        }
    }
}

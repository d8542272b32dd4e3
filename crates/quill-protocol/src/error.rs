//! Error taxonomy for the Quill engine.

use crate::ids::{DocumentId, Revision, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no match for the given text")]
    NoMatch,
    #[error("ambiguous match: {count} occurrences, resubmit with more surrounding context")]
    AmbiguousMatch { count: usize },
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("stale revision: expected {expected}, got {got}")]
    StaleRevision { expected: Revision, got: Revision },
    #[error("edit order conflict: expected {expected}, got {got}")]
    OrderConflict { expected: u64, got: u64 },
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Wrap any underlying store/transport failure.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Wire-level code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoMatch => ErrorCode::NoMatch,
            Self::AmbiguousMatch { .. } => ErrorCode::AmbiguousMatch,
            Self::DocumentNotFound(_) => ErrorCode::DocNotFound,
            Self::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Self::StaleRevision { .. } => ErrorCode::StaleRevision,
            Self::OrderConflict { .. } => ErrorCode::OrderConflict,
            Self::InvalidCommand(_) | Self::InvalidRange(_) => ErrorCode::InvalidCommand,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::Storage(_) => ErrorCode::Internal,
        }
    }

    /// True when the caller can correct the input and resubmit.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::NoMatch
                | Self::AmbiguousMatch { .. }
                | Self::StaleRevision { .. }
                | Self::OrderConflict { .. }
        )
    }
}

/// Stable wire codes surfaced to external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoMatch,
    AmbiguousMatch,
    DocNotFound,
    SessionNotFound,
    StaleRevision,
    OrderConflict,
    InvalidCommand,
    Forbidden,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::NoMatch => "NO_MATCH",
            Self::AmbiguousMatch => "AMBIGUOUS_MATCH",
            Self::DocNotFound => "DOC_NOT_FOUND",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::StaleRevision => "STALE_REVISION",
            Self::OrderConflict => "ORDER_CONFLICT",
            Self::InvalidCommand => "INVALID_COMMAND",
            Self::Forbidden => "FORBIDDEN",
            Self::Internal => "INTERNAL",
        };
        f.write_str(code)
    }
}

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

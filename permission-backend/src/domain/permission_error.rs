// permission-backend/src/domain/permission_error.rs
use crate::domain::conflict::Conflict;
use crate::domain::scope::Scope;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API利用者に返すエラー分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    BatchTooLarge,
    MissingRole,
    InvalidScope,
    InvalidRole,
    PermissionDenied,
    PreconditionFailed,
    UnresolvedBlockingConflict,
    RolledBack,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BatchTooLarge => "BATCH_TOO_LARGE",
            ErrorKind::MissingRole => "MISSING_ROLE",
            ErrorKind::InvalidScope => "INVALID_SCOPE",
            ErrorKind::InvalidRole => "INVALID_ROLE",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorKind::UnresolvedBlockingConflict => "UNRESOLVED_BLOCKING_CONFLICT",
            ErrorKind::RolledBack => "ROLLED_BACK",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 権限変更エンジンのエラー
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PermissionChangeError {
    #[error("Batch of {size} changes exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Change #{index} requires a role")]
    MissingRole { index: usize },

    #[error("Change #{index} references unknown scope {scope}")]
    InvalidScope { index: usize, scope: Scope },

    #[error("Change #{index}: {message}")]
    InvalidRole { index: usize, message: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0} blocking conflict(s) remain unresolved")]
    UnresolvedBlockingConflict(usize, Vec<Conflict>),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
}

impl PermissionChangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PermissionChangeError::BatchTooLarge { .. } => ErrorKind::BatchTooLarge,
            PermissionChangeError::MissingRole { .. } => ErrorKind::MissingRole,
            PermissionChangeError::InvalidScope { .. } => ErrorKind::InvalidScope,
            PermissionChangeError::InvalidRole { .. } => ErrorKind::InvalidRole,
            PermissionChangeError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            PermissionChangeError::UnresolvedBlockingConflict(..) => {
                ErrorKind::UnresolvedBlockingConflict
            }
            PermissionChangeError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
        }
    }
}

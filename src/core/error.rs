use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OgmError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Assigned identifier of '{type_name}' is unset; set it before saving")]
    UnsetAssignedId { type_name: String },

    #[error(
        "Optimistic lock conflict for {type_name}:{id} (expected version {expected}, actual {})",
        display_version(.actual)
    )]
    OptimisticLock {
        type_name: String,
        id: String,
        expected: i64,
        actual: Option<i64>,
    },

    #[error(
        "Unresolved reference from {source_type}.{field} to '{target_type}': target has no identifier and is not part of the write set"
    )]
    UnresolvedReference {
        source_type: String,
        field: String,
        target_type: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, OgmError>;

fn display_version(version: &Option<i64>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "unknown".to_string(),
    }
}

/// Coarse classification of an [`OgmError`], for callers deciding whether to
/// retry, re-read or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Mapping,
    OptimisticLock,
    UnresolvedReference,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Schema => "schema",
            Self::Mapping => "mapping",
            Self::OptimisticLock => "optimistic_lock",
            Self::UnresolvedReference => "unresolved_reference",
            Self::Storage => "storage",
        };
        write!(f, "{label}")
    }
}

impl OgmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_) => ErrorKind::Schema,
            Self::Mapping(_) | Self::UnsetAssignedId { .. } => ErrorKind::Mapping,
            Self::OptimisticLock { .. } => ErrorKind::OptimisticLock,
            Self::UnresolvedReference { .. } => ErrorKind::UnresolvedReference,
            Self::Storage(_) | Self::Lock(_) => ErrorKind::Storage,
        }
    }

    /// Only optimistic-lock conflicts are worth a re-read and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OptimisticLock { .. })
    }
}

impl<T> From<std::sync::PoisonError<T>> for OgmError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

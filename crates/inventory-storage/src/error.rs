//! Storage error types.

use std::fmt;

/// Failure reported by a storage plugin.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("{resource_type}/{id} does not exist")]
    NotFound { resource_type: String, id: String },

    /// The payload is not something the backend can store, e.g. a
    /// non-object record or patch.
    #[error("Rejected record: {0}")]
    InvalidRecord(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A `find_stream` cursor failed after it was opened.
    #[error("Record stream aborted: {0}")]
    Stream(String),

    #[error("Storage internal error: {0}")]
    Internal(String),
}

impl StorageError {
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord(message.into())
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    #[must_use]
    pub fn stream_error(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Coarse grouping used as a structured log field.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::Missing,
            Self::InvalidRecord(_) => ErrorCategory::Rejected,
            Self::Unavailable(_) | Self::Stream(_) => ErrorCategory::Backend,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Missing,
    Rejected,
    /// The backend or the connection to it failed.
    Backend,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Rejected => "rejected",
            Self::Backend => "backend",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

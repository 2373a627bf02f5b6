use std::fmt;
use thiserror::Error;

/// Which stage of query parsing rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    /// The input contains a character sequence that is not a token.
    Lexical,
    /// The tokens do not form a valid expression.
    Parse,
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxKind::Lexical => write!(f, "lexical"),
            SyntaxKind::Parse => write!(f, "parse"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Client input error: the filter expression is malformed.
    #[error("Invalid query string parameter: {kind} error at position {position}: {message}")]
    InvalidQuery {
        kind: SyntaxKind,
        position: usize,
        message: String,
    },

    /// Client input error: a window or projection parameter is malformed.
    #[error("Invalid query string parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    /// The query was valid but could not be executed.
    #[error("Query execution failed: {message}")]
    Internal { message: String },
}

impl QueryError {
    pub(crate) fn lexical(position: usize, message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            kind: SyntaxKind::Lexical,
            position,
            message: message.into(),
        }
    }

    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            kind: SyntaxKind::Parse,
            position,
            message: message.into(),
        }
    }

    /// Returns `true` for errors caused by the caller's input rather than
    /// by the system.
    #[must_use]
    pub fn is_invalid_query(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery { .. } | Self::InvalidParameter { .. }
        )
    }
}

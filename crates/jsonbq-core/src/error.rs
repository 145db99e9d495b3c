//! Error types for the query compiler.

use thiserror::Error;

/// Result type for compiler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the query compiler.
///
/// Errors are fatal for the calling build: no partial SQL is returned and
/// the caller sees the first failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ========================================================================
    // Path errors
    // ========================================================================
    #[error("empty JSON path")]
    EmptyPath,

    #[error("unclosed bracket in JSON path: {0}")]
    UnclosedBracket(String),

    #[error("unsupported negative index {0} in JSON path, only -1 is allowed")]
    UnsupportedNegativeIndex(i64),

    #[error("bare root path is not supported: {0}")]
    RootPathNotSupported(String),

    // ========================================================================
    // Filter errors
    // ========================================================================
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("operator `{0}` requires a non-empty path")]
    OperatorRequiresNonEmptyPath(String),

    #[error("invalid value for operator `{op}`: {reason}")]
    InvalidValueForOperator { op: String, reason: String },

    #[error("unsupported field type: {0}")]
    UnsupportedFieldType(String),

    #[error("filter for field `{0}` has no recognized operators")]
    EmptyFilter(String),

    // ========================================================================
    // Search errors
    // ========================================================================
    #[error("invalid search value: {0}")]
    InvalidSearchValue(String),

    // ========================================================================
    // Identifier errors
    // ========================================================================
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl Error {
    /// Shorthand for `InvalidValueForOperator`.
    pub fn invalid_value(op: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValueForOperator {
            op: op.to_string(),
            reason: reason.into(),
        }
    }
}

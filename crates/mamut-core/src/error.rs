//! Error types for component identity, lookup and scopes.
//!
//! This module provides error types using `thiserror` for ergonomic error handling
//! across the stack orchestrator.

use thiserror::Error;

/// Errors produced when decoding or validating component identifiers.
///
/// Decoding never coerces malformed input into a default identifier; every
/// structural problem is reported through one of these variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The text has no `<Kind>-` prefix at all.
    #[error("missing kind prefix in {text:?}")]
    MissingKind { text: String },

    /// The text carries a kind prefix other than the expected one.
    #[error("expected kind {expected} in {text:?}")]
    KindMismatch { expected: String, text: String },

    /// The kind tag itself is malformed.
    #[error("invalid kind {0:?}: kinds must be non-empty and must not contain '-'")]
    InvalidKind(String),

    /// The name segment exceeds the length bound.
    #[error("name segment is {len} characters, at most {max} allowed")]
    NameTooLong { len: usize, max: usize },

    /// A chain-scoped identifier has no chain segment.
    #[error("missing chain segment in {text:?}")]
    MissingChain { text: String },

    /// The chain segment is not a decimal chain ID.
    #[error("invalid chain segment {segment:?}")]
    InvalidChain { segment: String },

    /// An erased identifier does not have the shape a typed identifier needs.
    #[error("identifier {id} is not a {expected} identifier")]
    ShapeMismatch { id: String, expected: &'static str },
}

impl IdError {
    /// Creates a kind mismatch error.
    pub fn kind_mismatch(expected: impl Into<String>, text: impl Into<String>) -> Self {
        Self::KindMismatch {
            expected: expected.into(),
            text: text.into(),
        }
    }

    /// Creates an invalid chain error.
    pub fn invalid_chain(segment: impl Into<String>) -> Self {
        Self::InvalidChain {
            segment: segment.into(),
        }
    }
}

/// Errors produced when a matcher must resolve to exactly one element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// Nothing matched.
    #[error("no element matches {matcher}")]
    NotFound { matcher: String },

    /// More than one element matched.
    #[error("{count} elements match {matcher}, expected exactly one")]
    Ambiguous { matcher: String, count: usize },
}

/// General errors raised by core primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Identifier error.
    #[error(transparent)]
    Id(#[from] IdError),

    /// Matcher resolution error.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// An identifier was registered twice.
    #[error("duplicate registration of {id}")]
    Duplicate { id: String },

    /// The scope has already been closed.
    #[error("scope {scope} is already closed")]
    ScopeClosed { scope: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Creates a duplicate registration error.
    pub fn duplicate(id: impl std::fmt::Display) -> Self {
        Self::Duplicate { id: id.to_string() }
    }

    /// Returns true if this is an identity error.
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Id(_))
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IdError::kind_mismatch("L2CLNode", "L2ELNode-a-1");
        assert_eq!(err.to_string(), "expected kind L2CLNode in \"L2ELNode-a-1\"");

        let err = CoreError::duplicate("Supervisor-main");
        assert_eq!(err.to_string(), "duplicate registration of Supervisor-main");
    }

    #[test]
    fn test_error_classification() {
        assert!(CoreError::from(IdError::invalid_chain("x")).is_identity());
        assert!(!CoreError::duplicate("a").is_identity());
    }
}

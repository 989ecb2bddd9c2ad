//! Shared classification surface for every backend adapter

use std::fmt;
use thiserror::Error;

/// Result type for dberrors configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The semantic category a driver error was classified into.
///
/// Categories are exclusive: an error is at most one of them, and
/// `NotFound` takes precedence over everything a code table could say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The query matched no rows where one was expected.
    NotFound,
    /// An insert collided with a uniqueness or primary-key constraint.
    Exists,
    /// A write violated an integrity constraint.
    Conflict,
    /// The database reported transient contention (locked or busy).
    Retryable,
    /// The error carried nothing the adapter knows how to classify.
    Unclassified,
}

impl ErrorKind {
    pub fn is_not_found(self) -> bool {
        self == Self::NotFound
    }

    pub fn is_exists(self) -> bool {
        self == Self::Exists
    }

    pub fn is_conflict(self) -> bool {
        self == Self::Conflict
    }

    pub fn is_retryable(self) -> bool {
        self == Self::Retryable
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Exists => "exists",
            Self::Conflict => "conflict",
            Self::Retryable => "retryable",
            Self::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicates shared by every normalized database error.
///
/// Callers that only depend on this trait can swap backends without
/// touching their error handling.
pub trait Classified: std::error::Error + Send + Sync + 'static {
    /// The caller-supplied label of the entity the operation targeted.
    fn resource(&self) -> &str;

    fn kind(&self) -> ErrorKind;

    fn not_found(&self) -> bool {
        self.kind().is_not_found()
    }

    fn conflict(&self) -> bool {
        self.kind().is_conflict()
    }
}

/// Implemented by adapters whose backend can report "row already exists".
pub trait Exists: Classified {
    fn exists(&self) -> bool {
        self.kind().is_exists()
    }
}

/// Implemented by adapters whose backend reports transient contention.
pub trait Retryable: Classified {
    fn retry(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown database backend: {0}")]
    UnknownBackend(String),

    #[error("cannot infer database backend from url: {0}")]
    UnrecognizedUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates_are_exclusive() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::Exists,
            ErrorKind::Conflict,
            ErrorKind::Retryable,
            ErrorKind::Unclassified,
        ];

        for kind in kinds {
            let set = [
                kind.is_not_found(),
                kind.is_exists(),
                kind.is_conflict(),
                kind.is_retryable(),
            ];
            let expected = usize::from(kind != ErrorKind::Unclassified);
            assert_eq!(set.iter().filter(|b| **b).count(), expected, "{kind}");
        }
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
        assert_eq!(ErrorKind::Retryable.to_string(), "retryable");
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::UnknownBackend("oracle".into());
        assert_eq!(err.to_string(), "unknown database backend: oracle");
    }
}

//! Error types for LessonVault.
//!
//! Library crates use [`LessonVaultError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Coarse failure class used by the retry machinery.
///
/// Transient failures are retried with bounded backoff; permanent failures
/// surface immediately; fatal failures abort the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
    Fatal,
}

/// Top-level error type for all LessonVault operations.
#[derive(Debug, thiserror::Error)]
pub enum LessonVaultError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Discovery/caption source error, carrying its retry classification.
    #[error("source error: {message}")]
    Source {
        message: String,
        class: ErrorClass,
    },

    /// Object store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Caption parsing error (malformed WebVTT and friends).
    #[error("caption error: {message}")]
    Caption { message: String },

    /// No caption track exists for an item. A skippable, non-fatal outcome,
    /// not a failure.
    #[error("no transcript available")]
    NoTranscript,

    /// Catalog document unreadable or corrupt. Pipeline-fatal.
    #[error("catalog error: {message}")]
    Catalog { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LessonVaultError>;

impl LessonVaultError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a transient source error (timeout, 5xx, connection reset).
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Source {
            message: msg.into(),
            class: ErrorClass::Transient,
        }
    }

    /// Create a permanent source error (not found, removed, auth failure).
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Source {
            message: msg.into(),
            class: ErrorClass::Permanent,
        }
    }

    /// Create a caption error from any displayable message.
    pub fn caption(msg: impl Into<String>) -> Self {
        Self::Caption {
            message: msg.into(),
        }
    }

    /// Create a catalog (pipeline-fatal) error.
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Retry classification of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Source { class, .. } => *class,
            Self::Catalog { .. } | Self::Config { .. } => ErrorClass::Fatal,
            Self::Storage(_) | Self::Io { .. } => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LessonVaultError::config("missing bucket name");
        assert_eq!(err.to_string(), "config error: missing bucket name");

        let err = LessonVaultError::permanent("HTTP 404 for /topictree");
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn classification() {
        assert_eq!(
            LessonVaultError::transient("timeout").class(),
            ErrorClass::Transient
        );
        assert_eq!(
            LessonVaultError::permanent("gone").class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            LessonVaultError::catalog("corrupt document").class(),
            ErrorClass::Fatal
        );
        assert_eq!(LessonVaultError::NoTranscript.class(), ErrorClass::Permanent);
    }
}

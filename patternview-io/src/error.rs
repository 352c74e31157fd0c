//! I/O error types.

use std::fmt;

use thiserror::Error;

use crate::format::PatternFormat;

/// Broad category of a [`LoadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    /// The file does not exist.
    NotFound,
    /// The file exists but could not be read.
    Io,
    /// The file was read but its contents could not be parsed.
    Malformed,
    /// The contents parsed but violate a pattern invariant.
    Invalid,
    /// The format is recognized but no reader is available for it.
    UnsupportedFormat,
}

impl fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadErrorKind::NotFound => "not found",
            LoadErrorKind::Io => "I/O error",
            LoadErrorKind::Malformed => "malformed file",
            LoadErrorKind::Invalid => "invalid pattern",
            LoadErrorKind::UnsupportedFormat => "unsupported format",
        })
    }
}

/// Failure to load a pattern. The model is never touched when this occurs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct LoadError {
    /// Category.
    pub kind: LoadErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl LoadError {
    /// Creates an error.
    pub fn new(kind: LoadErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        let kind = if err.kind() == std::io::ErrorKind::NotFound {
            LoadErrorKind::NotFound
        } else {
            LoadErrorKind::Io
        };
        Self::new(kind, err.to_string())
    }
}

impl From<patternview_core::PatternError> for LoadError {
    fn from(err: patternview_core::PatternError) -> Self {
        Self::new(LoadErrorKind::Invalid, err.to_string())
    }
}

/// Failure to save a pattern.
#[derive(Error, Debug)]
pub enum SaveError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No writer exists for this format.
    #[error("no writer for {0}")]
    UnsupportedFormat(PatternFormat),
}

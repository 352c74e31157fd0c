//! patternview-io: Pattern loaders and writers.
//!
//! This crate provides the loader/writer seam the model and CLI use to get
//! patterns in and out of files, format detection by extension, and the
//! native JSON interchange codec.
//!

mod error;
mod format;
pub mod json;

use std::path::Path;

use patternview_core::Pattern;

pub use error::{LoadError, LoadErrorKind, SaveError};
pub use format::PatternFormat;
pub use json::JsonCodec;

/// Reads a pattern from a file.
pub trait PatternLoader {
    /// Loads the pattern stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] describing why the file could not be turned
    /// into a valid pattern.
    fn load(&self, path: &Path) -> Result<Pattern, LoadError>;
}

/// Writes a pattern to a file.
pub trait PatternWriter {
    /// Serializes `pattern` to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns a [`SaveError`] on I/O or encoding failure.
    fn save(&self, path: &Path, pattern: &Pattern) -> Result<(), SaveError>;
}

/// Loads `path`, choosing the reader from its extension.
///
/// # Errors
///
/// [`LoadErrorKind::UnsupportedFormat`] for unknown extensions and for
/// recognized formats without a built-in reader; otherwise whatever the
/// reader reports.
pub fn load_pattern(path: &Path) -> Result<Pattern, LoadError> {
    match PatternFormat::from_path(path) {
        Some(PatternFormat::Json) => JsonCodec::new().load(path),
        Some(format) => Err(LoadError::new(
            LoadErrorKind::UnsupportedFormat,
            format!("{}: no reader for {format}", path.display()),
        )),
        None => Err(LoadError::new(
            LoadErrorKind::UnsupportedFormat,
            format!("{}: unrecognized file extension", path.display()),
        )),
    }
}

/// Saves `pattern` to `path` in `format`.
///
/// # Errors
///
/// [`SaveError::UnsupportedFormat`] when no writer exists for `format`.
pub fn save_pattern(
    path: &Path,
    format: PatternFormat,
    pattern: &Pattern,
) -> Result<(), SaveError> {
    match format {
        PatternFormat::Json => JsonCodec::new().with_pretty(true).save(path, pattern),
        other => Err(SaveError::UnsupportedFormat(other)),
    }
}

//! File format detection.

use std::fmt;
use std::path::Path;

/// Pattern file formats known to the viewer.
///
/// Only [`PatternFormat::Json`] has a built-in reader and writer; the vendor
/// formats are recognized so callers get a precise
/// [`crate::LoadErrorKind::UnsupportedFormat`] instead of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternFormat {
    /// Native JSON interchange (`.json`).
    Json,
    /// GRASP cut file (`.cut`).
    GraspCut,
    /// NSI far-field data (`.ffd`).
    NsiFarField,
    /// NumPy pattern archive (`.npz`).
    NumpyArchive,
    /// TICRA spherical wave expansion (`.sph`).
    TicraSph,
    /// ATAMS measurement file (`.atams`).
    Atams,
}

impl PatternFormat {
    /// Every known format.
    pub const ALL: [PatternFormat; 6] = [
        PatternFormat::Json,
        PatternFormat::GraspCut,
        PatternFormat::NsiFarField,
        PatternFormat::NumpyArchive,
        PatternFormat::TicraSph,
        PatternFormat::Atams,
    ];

    /// Detects the format from a file extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }

    /// Canonical extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            PatternFormat::Json => "json",
            PatternFormat::GraspCut => "cut",
            PatternFormat::NsiFarField => "ffd",
            PatternFormat::NumpyArchive => "npz",
            PatternFormat::TicraSph => "sph",
            PatternFormat::Atams => "atams",
        }
    }

    /// Returns true if this crate can read and write the format.
    #[must_use]
    pub fn is_supported(self) -> bool {
        matches!(self, PatternFormat::Json)
    }
}

impl fmt::Display for PatternFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatternFormat::Json => "JSON pattern",
            PatternFormat::GraspCut => "GRASP cut file",
            PatternFormat::NsiFarField => "NSI far-field data",
            PatternFormat::NumpyArchive => "NumPy pattern archive",
            PatternFormat::TicraSph => "TICRA spherical wave expansion",
            PatternFormat::Atams => "ATAMS measurement file",
        })
    }
}

//! Native JSON interchange format.
//!
//! Samples are stored flattened in `(frequency, cut, angle)` order as
//! `[re, im]` pairs. The transform history of a derived pattern is written
//! oldest first and restored on load, so `Pattern::history` of a reloaded
//! pattern matches the saved one. The loaded pattern's source is the file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::Array3;
use num_complex::Complex64;
use patternview_core::{FieldUnit, Pattern, Polarization, Provenance, Transform};
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadErrorKind, SaveError};
use crate::{PatternLoader, PatternWriter};

/// Current document version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PatternDocument {
    format_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    frequencies: Vec<f64>,
    cuts: Vec<f64>,
    angles: Vec<f64>,
    polarization: Polarization,
    #[serde(default)]
    unit: FieldUnit,
    co: Vec<[f64; 2]>,
    cross: Vec<[f64; 2]>,
    /// Oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<Transform>,
}

impl PatternDocument {
    fn from_pattern(pattern: &Pattern) -> Self {
        let flatten = |data: &Array3<Complex64>| -> Vec<[f64; 2]> {
            data.iter().map(|v| [v.re, v.im]).collect()
        };
        let mut history: Vec<Transform> = pattern.history().cloned().collect();
        history.reverse();
        Self {
            format_version: FORMAT_VERSION,
            source: pattern.source_label().map(str::to_owned),
            frequencies: pattern.frequencies().to_vec(),
            cuts: pattern.cuts().to_vec(),
            angles: pattern.angles().to_vec(),
            polarization: pattern.polarization(),
            unit: pattern.unit(),
            co: flatten(pattern.co()),
            cross: flatten(pattern.cross()),
            history,
        }
    }

    fn into_pattern(self, label: String) -> Result<Pattern, LoadError> {
        if self.format_version > FORMAT_VERSION {
            return Err(LoadError::new(
                LoadErrorKind::Malformed,
                format!(
                    "format version {} is newer than supported version {FORMAT_VERSION}",
                    self.format_version
                ),
            ));
        }
        let shape = (self.frequencies.len(), self.cuts.len(), self.angles.len());
        let unflatten = |name: &str, data: Vec<[f64; 2]>| {
            let len = data.len();
            Array3::from_shape_vec(
                shape,
                data.into_iter().map(|[re, im]| Complex64::new(re, im)).collect(),
            )
            .map_err(|_| {
                LoadError::new(
                    LoadErrorKind::Malformed,
                    format!("{name} has {len} samples, axes need {shape:?}"),
                )
            })
        };
        let co = unflatten("co", self.co)?;
        let cross = unflatten("cross", self.cross)?;
        let provenance = if self.history.is_empty() {
            Provenance::Source { label }
        } else {
            Provenance::Restored {
                label,
                history: self.history,
            }
        };
        Ok(Pattern::new(
            self.frequencies,
            self.cuts,
            self.angles,
            self.polarization,
            co,
            cross,
        )?
        .with_unit(self.unit)
        .with_provenance(provenance))
    }
}

/// Reader and writer for [`crate::PatternFormat::Json`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Creates a codec writing compact JSON.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes indented JSON.
    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl PatternLoader for JsonCodec {
    fn load(&self, path: &Path) -> Result<Pattern, LoadError> {
        let reader = BufReader::new(File::open(path)?);
        let document: PatternDocument = serde_json::from_reader(reader).map_err(|e| {
            let kind = if e.is_io() {
                LoadErrorKind::Io
            } else {
                LoadErrorKind::Malformed
            };
            LoadError::new(kind, format!("{}: {e}", path.display()))
        })?;
        let pattern = document.into_pattern(path.display().to_string())?;
        log::debug!(
            "Loaded {} ({} frequencies, {} cuts, {} angles)",
            path.display(),
            pattern.frequencies().len(),
            pattern.cuts().len(),
            pattern.angles().len()
        );
        Ok(pattern)
    }
}

impl PatternWriter for JsonCodec {
    fn save(&self, path: &Path, pattern: &Pattern) -> Result<(), SaveError> {
        let document = PatternDocument::from_pattern(pattern);
        let mut writer = BufWriter::new(File::create(path)?);
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, &document)?;
        } else {
            serde_json::to_writer(&mut writer, &document)?;
        }
        writer.flush()?;
        Ok(())
    }
}

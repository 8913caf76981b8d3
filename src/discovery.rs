//! Locating per-method trace files by filename convention.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

/// Suffix written by the plotting scripts' narrow trace files.
pub const DEFAULT_SUFFIX: &str = "_convergence.csv";

/// Filename convention `<method-name><suffix>` used to recognise trace files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TracePattern {
    suffix: String,
}

impl TracePattern {
    /// Matches file names ending with `suffix`. A leading `*` is ignored, so
    /// both `_convergence.csv` and `*_convergence.csv` are accepted.
    pub fn suffix(suffix: impl AsRef<str>) -> Self {
        let suffix = suffix.as_ref();
        Self {
            suffix: suffix.strip_prefix('*').unwrap_or(suffix).to_string(),
        }
    }

    /// The suffix without any leading wildcard.
    pub fn as_str(&self) -> &str {
        &self.suffix
    }

    /// Returns the method label for a matching file name.
    ///
    /// The suffix is stripped first, then any remaining extension. A name that
    /// leaves nothing behind falls back to its file stem.
    pub fn method_label(&self, file_name: &str) -> Option<String> {
        if self.suffix.is_empty() {
            return None;
        }
        let stem = file_name.strip_suffix(self.suffix.as_str())?;
        let label = match stem.rfind('.') {
            Some(dot) if dot > 0 => &stem[..dot],
            _ => stem,
        };
        if label.is_empty() {
            let fallback = Path::new(file_name).file_stem()?.to_str()?;
            return Some(fallback.to_string());
        }
        Some(label.to_string())
    }
}

impl Default for TracePattern {
    fn default() -> Self {
        Self::suffix(DEFAULT_SUFFIX)
    }
}

impl From<String> for TracePattern {
    fn from(value: String) -> Self {
        Self::suffix(value)
    }
}

impl From<TracePattern> for String {
    fn from(value: TracePattern) -> Self {
        value.suffix
    }
}

/// One discovered narrow trace file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TraceFile {
    path: PathBuf,
    method_label: String,
}

impl TraceFile {
    /// Describes a trace file whose label is already known.
    pub fn new(path: impl Into<PathBuf>, method_label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method_label: method_label.into(),
        }
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name derived from the file name.
    pub fn method_label(&self) -> &str {
        &self.method_label
    }
}

/// Lists the regular files directly inside `directory` that match `pattern`.
///
/// An empty result is not an error. The returned files are sorted by file name
/// so repeated runs over the same directory see the same order.
pub fn discover_traces(
    directory: impl AsRef<Path>,
    pattern: &TracePattern,
) -> Result<Vec<TraceFile>> {
    let directory = directory.as_ref();
    let entries = fs::read_dir(directory).map_err(|e| TraceError::io(directory, e))?;

    let mut traces = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TraceError::io(directory, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| TraceError::io(entry.path(), e))?;
        // Symlinks are followed so linked result files are still found.
        let is_file = file_type.is_file()
            || (file_type.is_symlink()
                && entry.path().metadata().map(|m| m.is_file()).unwrap_or(false));
        if !is_file {
            continue;
        }

        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            debug!("skipping non UTF-8 file name {:?}", file_name);
            continue;
        };
        if let Some(label) = pattern.method_label(name) {
            traces.push(TraceFile::new(entry.path(), label));
        }
    }

    traces.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    info!(
        "found {} trace file(s) matching `*{}` in {}",
        traces.len(),
        pattern.as_str(),
        directory.display()
    );
    Ok(traces)
}

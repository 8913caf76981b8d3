use std::path::{Path, PathBuf};

use thiserror::Error;

/// Unified error type for `convplot` operations.
///
/// Row-level problems never appear here: a bad row is skipped and counted in
/// [`RowSkips`](crate::series::RowSkips). Only file-level and run-level
/// failures are represented.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Raised when a trace file or directory cannot be opened or read.
    #[error("cannot read `{}`: {source}", path.display())]
    Io {
        /// File or directory that was being accessed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Raised when a trace file is not recognisable as delimited tabular data.
    #[error("`{}` is not delimited tabular data: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    /// Raised when the csv reader itself fails part-way through a file.
    #[error("failed to parse `{}`: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Raised when the header row lacks a required column.
    #[error("`{}` has no `{column}` column", path.display())]
    MissingColumn {
        /// Trace file that was inspected.
        path: PathBuf,
        /// Name of the column that was expected in the header.
        column: String,
    },

    /// Raised when a wide trace file carries no `Residual (<Method>)` columns.
    #[error("`{}` has no residual columns named `{prefix}<method>{suffix}`", path.display())]
    NoResidualColumns {
        path: PathBuf,
        prefix: String,
        suffix: String,
    },

    /// Raised when every loaded series turned out to be empty.
    #[error("nothing to plot: no series contains a valid (iteration, residual) point")]
    NothingToPlot,

    /// Raised when drawing or encoding the chart fails.
    #[error("failed to render chart to `{}`: {message}", path.display())]
    Render { path: PathBuf, message: String },

    /// Raised when chart or loader options are out of range.
    #[error("invalid options: {reason}")]
    InvalidOptions { reason: String },

    /// Raised when a configuration file cannot be parsed.
    #[error("invalid configuration: {source}")]
    Config {
        #[source]
        source: toml::de::Error,
    },
}

impl TraceError {
    /// Helper to wrap an I/O failure together with the path that caused it.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Helper for files that cannot be read as a table at all.
    pub fn malformed(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Helper for csv reader failures on a given file.
    pub fn csv(path: impl AsRef<Path>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Helper for a header that lacks `column`.
    pub fn missing_column(path: impl AsRef<Path>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            path: path.as_ref().to_path_buf(),
            column: column.into(),
        }
    }

    /// Helper for rendering failures.
    pub fn render(path: impl AsRef<Path>, message: impl ToString) -> Self {
        Self::Render {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Helper for rejected options.
    pub fn invalid_options(reason: impl Into<String>) -> Self {
        Self::InvalidOptions {
            reason: reason.into(),
        }
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, TraceError>;

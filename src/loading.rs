//! Loading residual traces from delimited files.
//!
//! Two layouts are supported behind the [`SeriesSource`] trait:
//!
//! - a narrow file per method (`Iteration`, `Residual`), located through
//!   [`discover_traces`](crate::discovery::discover_traces) and labelled from
//!   its file name, and
//! - a single wide file (`Iteration`, `Residual (Jacobi)`, `Residual (SOR)`, ...)
//!   that yields one series per residual column.
//!
//! Both go through the same row validation in [`SeriesBuilder`], so a bad row
//! is skipped and counted while a missing column fails the whole file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::ByteRecord;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::discovery::TraceFile;
use crate::error::{Result, TraceError};
use crate::series::{ConvergenceSeries, SeriesBuilder};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Field separator of a trace file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// Sniff the header line: comma, then tab, then semicolon, else whitespace.
    #[default]
    Auto,
    Comma,
    Tab,
    Semicolon,
    /// One or more spaces or tabs, as written by the native solver.
    Whitespace,
}

impl Delimiter {
    /// Picks a concrete delimiter for `data`, leaving explicit choices untouched.
    pub fn resolve(self, data: &[u8]) -> Self {
        if self != Delimiter::Auto {
            return self;
        }
        let header = data
            .split(|b| *b == b'\n')
            .find(|line| !line.iter().all(u8::is_ascii_whitespace))
            .unwrap_or(&[]);
        if header.contains(&b',') {
            Delimiter::Comma
        } else if header.contains(&b'\t') {
            Delimiter::Tab
        } else if header.contains(&b';') {
            Delimiter::Semicolon
        } else {
            Delimiter::Whitespace
        }
    }

    fn byte(self) -> u8 {
        match self {
            Delimiter::Auto | Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
            Delimiter::Semicolon => b';',
            Delimiter::Whitespace => b' ',
        }
    }
}

impl FromStr for Delimiter {
    type Err = TraceError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Delimiter::Auto),
            "comma" | "," => Ok(Delimiter::Comma),
            "tab" | "\\t" => Ok(Delimiter::Tab),
            "semicolon" | ";" => Ok(Delimiter::Semicolon),
            "whitespace" | "space" => Ok(Delimiter::Whitespace),
            other => Err(TraceError::invalid_options(format!(
                "unknown delimiter `{other}` (expected auto, comma, tab, semicolon or whitespace)"
            ))),
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Delimiter::Auto => "auto",
            Delimiter::Comma => "comma",
            Delimiter::Tab => "tab",
            Delimiter::Semicolon => "semicolon",
            Delimiter::Whitespace => "whitespace",
        };
        f.write_str(name)
    }
}

/// Column naming and parsing options shared by both layouts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Field separator.
    pub delimiter: Delimiter,
    /// Header of the iteration column.
    pub iteration_column: String,
    /// Header of the residual column in narrow files.
    pub residual_column: String,
    /// Text before the method name in wide residual headers.
    pub wide_prefix: String,
    /// Text after the method name in wide residual headers.
    pub wide_suffix: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Auto,
            iteration_column: "Iteration".to_string(),
            residual_column: "Residual".to_string(),
            wide_prefix: "Residual (".to_string(),
            wide_suffix: ")".to_string(),
        }
    }
}

impl LoadOptions {
    /// Override the field separator.
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Override the iteration column header.
    pub fn with_iteration_column(mut self, column: impl Into<String>) -> Self {
        self.iteration_column = column.into();
        self
    }

    /// Override the narrow residual column header.
    pub fn with_residual_column(mut self, column: impl Into<String>) -> Self {
        self.residual_column = column.into();
        self
    }

    /// Override the `prefix<method>suffix` shape of wide residual headers.
    pub fn with_wide_columns(
        mut self,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        self.wide_prefix = prefix.into();
        self.wide_suffix = suffix.into();
        self
    }
}

/// Anything that can produce convergence series for the renderer.
pub trait SeriesSource {
    /// File the series are read from, used in reports.
    fn source_path(&self) -> &Path;

    /// Loads every series this source provides.
    fn load(&self, options: &LoadOptions) -> Result<Vec<ConvergenceSeries>>;
}

impl SeriesSource for TraceFile {
    fn source_path(&self) -> &Path {
        self.path()
    }

    fn load(&self, options: &LoadOptions) -> Result<Vec<ConvergenceSeries>> {
        load_series(self, options).map(|series| vec![series])
    }
}

/// Loads a narrow trace file into a single series labelled after the file.
pub fn load_series(trace: &TraceFile, options: &LoadOptions) -> Result<ConvergenceSeries> {
    let path = trace.path();
    let table = read_table(path, options.delimiter)?;
    let iteration = table.column(path, &options.iteration_column)?;
    let residual = table.column(path, &options.residual_column)?;

    let mut builder = SeriesBuilder::new(trace.method_label());
    for row in &table.rows {
        builder.push_row(field(row, iteration), field(row, residual));
    }
    let series = builder.build();
    log_loaded(path, &series, table.rows.len());
    Ok(series)
}

/// A single wide file holding one residual column per method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WideTraceFile {
    path: PathBuf,
    labels: BTreeMap<String, String>,
}

impl WideTraceFile {
    /// Describes a wide trace file; labels default to the method names found in
    /// the column headers.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Displays `method` as `label` (e.g. `SOR` as `SOR (w = 1.7)`).
    pub fn with_label(mut self, method: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(method.into(), label.into());
        self
    }

    /// Replaces all label overrides at once.
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_label(&self, method: &str) -> String {
        self.labels
            .get(method)
            .cloned()
            .unwrap_or_else(|| method.to_string())
    }
}

impl SeriesSource for WideTraceFile {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn load(&self, options: &LoadOptions) -> Result<Vec<ConvergenceSeries>> {
        let path = self.path.as_path();
        let table = read_table(path, options.delimiter)?;
        let iteration_index = table.column(path, &options.iteration_column)?;

        let mut columns: Vec<(usize, SeriesBuilder)> = table
            .headers
            .iter()
            .enumerate()
            .filter_map(|(index, header)| {
                let method = residual_column_label(header, options)?;
                Some((index, SeriesBuilder::new(self.display_label(method))))
            })
            .collect();
        if columns.is_empty() {
            return Err(TraceError::NoResidualColumns {
                path: self.path.clone(),
                prefix: options.wide_prefix.clone(),
                suffix: options.wide_suffix.clone(),
            });
        }

        for row in &table.rows {
            let iteration = field(row, iteration_index);
            for (index, builder) in columns.iter_mut() {
                builder.push_row(iteration, field(row, *index));
            }
        }

        let series: Vec<ConvergenceSeries> = columns
            .into_iter()
            .map(|(_, builder)| builder.build())
            .collect();
        for s in &series {
            log_loaded(path, s, table.rows.len());
        }
        Ok(series)
    }
}

/// Extracts the method name from a wide residual header such as
/// `Residual (Gauss-Seidel)`.
pub fn residual_column_label<'a>(header: &'a str, options: &LoadOptions) -> Option<&'a str> {
    let inner = header
        .trim()
        .strip_prefix(options.wide_prefix.as_str())?
        .strip_suffix(options.wide_suffix.as_str())?
        .trim();
    (!inner.is_empty()).then_some(inner)
}

struct Table {
    headers: Vec<String>,
    rows: Vec<ByteRecord>,
}

impl Table {
    fn column(&self, path: &Path, name: &str) -> Result<usize> {
        let wanted = name.trim();
        self.headers
            .iter()
            .position(|header| header == wanted)
            .ok_or_else(|| TraceError::missing_column(path, wanted))
    }
}

/// Reads the whole file and closes it before parsing.
fn read_table(path: &Path, delimiter: Delimiter) -> Result<Table> {
    let bytes = fs::read(path).map_err(|e| TraceError::io(path, e))?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes.as_slice());
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(TraceError::malformed(path, "file is empty"));
    }

    let delimiter = delimiter.resolve(body);
    let collapsed;
    let data: &[u8] = if delimiter == Delimiter::Whitespace {
        collapsed = collapse_whitespace(body);
        &collapsed
    } else {
        body
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter.byte())
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(|e| TraceError::csv(path, e))?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(TraceError::malformed(path, "header row is blank"));
    }

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        rows.push(record.map_err(|e| TraceError::csv(path, e))?);
    }
    debug!(
        "{}: {} column(s), {} row(s), {} separated",
        path.display(),
        headers.len(),
        rows.len(),
        delimiter
    );
    Ok(Table { headers, rows })
}

/// Rewrites runs of spaces and tabs as single spaces, line by line.
fn collapse_whitespace(data: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(data);
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        if let Some(first) = fields.next() {
            out.push_str(first);
            for f in fields {
                out.push(' ');
                out.push_str(f);
            }
        }
        out.push('\n');
    }
    out.into_bytes()
}

fn field(row: &ByteRecord, index: usize) -> Option<&str> {
    // Invalid UTF-8 is kept as an unparsable value rather than a missing one.
    row.get(index)
        .map(|bytes| std::str::from_utf8(bytes).unwrap_or("\u{FFFD}"))
}

fn log_loaded(path: &Path, series: &ConvergenceSeries, rows: usize) {
    let skips = series.skips();
    if skips.total() > 0 {
        debug!(
            "{} [{}]: kept {} of {} row(s); skipped {} missing, {} unparsable, {} non-positive, \
             {} non-finite, {} duplicate",
            path.display(),
            series.label(),
            series.len(),
            rows,
            skips.missing,
            skips.unparsable,
            skips.non_positive,
            skips.non_finite,
            skips.duplicate
        );
    } else {
        debug!(
            "{} [{}]: kept all {} row(s)",
            path.display(),
            series.label(),
            series.len()
        );
    }
}

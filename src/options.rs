//! Chart and pipeline configuration.
//!
//! Everything a run needs (where to look, how to parse, what to draw, where to
//! write) is passed in through these structs; nothing is tied to a particular
//! machine layout. [`PipelineConfig`] can be read from TOML:
//!
//! ```toml
//! [source]
//! kind = "directory"
//! directory = "results"
//! pattern = "*_convergence.csv"
//!
//! [chart]
//! title = "Convergence of Jacobi, Gauss-Seidel and SOR"
//! output = "convergence.png"
//! dpi = 300
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::discovery::TracePattern;
use crate::error::{Result, TraceError};
use crate::loading::LoadOptions;

/// Largest accepted image edge, in pixels.
pub const MAX_PIXELS: u32 = 20_000;

/// Appearance and destination of the comparison chart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOptions {
    /// Caption drawn above the plot.
    pub title: String,
    /// Label of the linear iteration axis.
    pub x_label: String,
    /// Label of the logarithmic residual axis.
    pub y_label: String,
    /// Figure width in inches.
    pub width_in: f64,
    /// Figure height in inches.
    pub height_in: f64,
    /// Output resolution in dots per inch.
    pub dpi: u32,
    /// Image destination; the format follows the extension (`.png`, `.svg`, ...).
    pub output: Option<PathBuf>,
    /// Open the rendered image in the system viewer.
    pub display: bool,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: "Convergence Rates of Iterative Methods".to_string(),
            x_label: "Iteration".to_string(),
            y_label: "Residual (log scale)".to_string(),
            width_in: 10.0,
            height_in: 10.0,
            dpi: 100,
            output: None,
            display: false,
        }
    }
}

impl ChartOptions {
    /// Override the chart title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Override both axis labels.
    pub fn with_axis_labels(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_label = x.into();
        self.y_label = y.into();
        self
    }

    /// Set the figure size in inches.
    pub fn with_size(mut self, width_in: f64, height_in: f64) -> Self {
        self.width_in = width_in;
        self.height_in = height_in;
        self
    }

    /// Set the output resolution.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Write the chart to `path`.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Enable or disable opening the chart in a viewer.
    pub fn with_display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    /// Checks that the figure size and resolution give a drawable image.
    pub fn validate(&self) -> Result<()> {
        if self.dpi == 0 {
            return Err(TraceError::invalid_options("dpi must be positive"));
        }
        for (name, inches) in [("width", self.width_in), ("height", self.height_in)] {
            if !inches.is_finite() || inches <= 0.0 {
                return Err(TraceError::invalid_options(format!(
                    "figure {name} must be a positive number of inches, found {inches}"
                )));
            }
        }
        let (w, h) = self.pixel_size_unchecked();
        if w < 64.0 || h < 64.0 || w > MAX_PIXELS as f64 || h > MAX_PIXELS as f64 {
            return Err(TraceError::invalid_options(format!(
                "image would be {w:.0}x{h:.0} pixels; each edge must be between 64 and {MAX_PIXELS}"
            )));
        }
        Ok(())
    }

    /// Image size in pixels (`inches * dpi`, rounded).
    pub fn pixel_size(&self) -> (u32, u32) {
        let (w, h) = self.pixel_size_unchecked();
        (w as u32, h as u32)
    }

    /// Multiplier applied to fonts, strokes and markers relative to 100 dpi.
    pub fn scale(&self) -> f64 {
        self.dpi as f64 / 100.0
    }

    fn pixel_size_unchecked(&self) -> (f64, f64) {
        let dpi = self.dpi as f64;
        ((self.width_in * dpi).round(), (self.height_in * dpi).round())
    }
}

/// Where the series come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// One narrow file per method, discovered by file name suffix.
    Directory {
        directory: PathBuf,
        #[serde(default)]
        pattern: TracePattern,
    },
    /// A single wide file with one residual column per method.
    Wide {
        file: PathBuf,
        /// Method name (as found in the header) to display label.
        #[serde(default)]
        labels: BTreeMap<String, String>,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Directory {
            directory: PathBuf::from("."),
            pattern: TracePattern::default(),
        }
    }
}

/// Full input of [`run`](crate::pipeline::run).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub load: LoadOptions,
    pub chart: ChartOptions,
}

impl PipelineConfig {
    /// Discover `*<suffix>` files in `directory`.
    pub fn directory(directory: impl Into<PathBuf>, pattern: TracePattern) -> Self {
        Self {
            source: SourceConfig::Directory {
                directory: directory.into(),
                pattern,
            },
            ..Self::default()
        }
    }

    /// Read every method from one wide file.
    pub fn wide(file: impl Into<PathBuf>, labels: BTreeMap<String, String>) -> Self {
        Self {
            source: SourceConfig::Wide {
                file: file.into(),
                labels,
            },
            ..Self::default()
        }
    }

    /// Replace the loader options.
    pub fn with_load(mut self, load: LoadOptions) -> Self {
        self.load = load;
        self
    }

    /// Replace the chart options.
    pub fn with_chart(mut self, chart: ChartOptions) -> Self {
        self.chart = chart;
        self
    }

    /// Parses a TOML document; missing sections take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|source| TraceError::Config { source })
    }

    /// Reads and parses a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| TraceError::io(path, e))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::Delimiter;

    #[test]
    fn defaults_are_valid() {
        let options = ChartOptions::default();
        options.validate().unwrap();
        assert_eq!(options.pixel_size(), (1000, 1000));
    }

    #[test]
    fn validation_rejects_degenerate_sizes() {
        assert!(ChartOptions::default().with_dpi(0).validate().is_err());
        assert!(ChartOptions::default().with_size(-1.0, 4.0).validate().is_err());
        assert!(ChartOptions::default().with_size(f64::NAN, 4.0).validate().is_err());
        assert!(ChartOptions::default().with_dpi(5000).validate().is_err());
        assert!(ChartOptions::default().with_size(0.1, 0.1).validate().is_err());
    }

    #[test]
    fn toml_directory_config() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [source]
            kind = "directory"
            directory = "results"
            pattern = "*_convergenceRates.csv"

            [load]
            delimiter = "whitespace"

            [chart]
            title = "Parallel solvers"
            dpi = 300
            output = "plot.png"
            "#,
        )
        .unwrap();

        match &config.source {
            SourceConfig::Directory { directory, pattern } => {
                assert_eq!(directory, &PathBuf::from("results"));
                assert_eq!(pattern.as_str(), "_convergenceRates.csv");
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(config.load.delimiter, Delimiter::Whitespace);
        assert_eq!(config.load.iteration_column, "Iteration");
        assert_eq!(config.chart.dpi, 300);
        assert_eq!(config.chart.output, Some(PathBuf::from("plot.png")));
        assert_eq!(config.chart.x_label, "Iteration");
    }

    #[test]
    fn toml_wide_config_with_labels() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [source]
            kind = "wide"
            file = "Convergence_Data.csv"

            [source.labels]
            SOR = "SOR (1.7)"
            "#,
        )
        .unwrap();
        match config.source {
            SourceConfig::Wide { labels, .. } => {
                assert_eq!(labels.get("SOR").map(String::as_str), Some("SOR (1.7)"))
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn wide_source_requires_a_file() {
        let err = PipelineConfig::from_toml_str("[source]\nkind = \"wide\"\n").unwrap_err();
        assert!(matches!(err, TraceError::Config { .. }));
    }
}

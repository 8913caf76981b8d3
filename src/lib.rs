//! Comparative convergence plots for iterative linear solvers.
//!
//! Solvers such as Jacobi, Gauss-Seidel and SOR, running in a separate native
//! program, leave their residual history behind as delimited text files. This
//! crate turns those traces into a single chart with one marked line per
//! method on a logarithmic residual axis. It offers tools to
//!
//! - locate per-method trace files by name (`discovery` module),
//! - load and validate `(iteration, residual)` rows from narrow or wide files
//!   (`loading` and `series` modules),
//! - lay out and draw the comparison chart (`render` module), and
//! - run the whole discover, load, render pass from one configuration
//!   (`pipeline` and `options` modules).
//!
//! Rows that cannot sit on a log axis (zero, negative, non-numeric or missing
//! residuals) are skipped and counted; files that cannot be read are reported
//! and left out; only a run with nothing left to plot stops short of a chart.
//!
//! # Quick start
//!
//! ```no_run
//! use convplot::discovery::TracePattern;
//! use convplot::options::{ChartOptions, PipelineConfig};
//! use convplot::pipeline::{run, RunOutcome};
//!
//! let chart = ChartOptions::default()
//!     .with_title("Convergence of Jacobi, Gauss-Seidel and SOR (w = 1.7)")
//!     .with_output("convergence.png")
//!     .with_dpi(300);
//! let config = PipelineConfig::directory("results", TracePattern::suffix("_convergence.csv"))
//!     .with_chart(chart);
//!
//! let report = run(&config).expect("chart written");
//! if report.outcome == RunOutcome::NoTraces {
//!     println!("no trace files found");
//! }
//! ```

pub mod discovery;
pub mod error;
pub mod loading;
pub mod options;
pub mod pipeline;
pub mod render;
pub mod series;
pub mod viewer;

pub use discovery::{discover_traces, TraceFile, TracePattern};
pub use error::{Result, TraceError};
pub use loading::{load_series, LoadOptions, SeriesSource, WideTraceFile};
pub use options::{ChartOptions, PipelineConfig};
pub use render::{render, ComparisonChart};
pub use series::ConvergenceSeries;

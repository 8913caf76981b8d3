//! Single pass from configuration to chart: discover, load each, filter, render.

use std::path::PathBuf;

use log::{info, warn};
use serde::Serialize;

use crate::discovery::discover_traces;
use crate::error::{Result, TraceError};
use crate::loading::{LoadOptions, SeriesSource, WideTraceFile};
use crate::options::{PipelineConfig, SourceConfig};
use crate::render::{render, ComparisonChart};
use crate::series::{ConvergenceSeries, SeriesSummary};

/// How a run ended when it did not fail outright.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The chart was laid out and written/shown as requested.
    Rendered { output: Option<PathBuf> },
    /// Discovery matched no file.
    NoTraces,
    /// Files were found but none produced a plottable point.
    NothingToPlot,
}

/// A trace file that could not be loaded; the run carried on without it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// What happened during [`run`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    /// Every source considered, in load order.
    pub sources: Vec<PathBuf>,
    /// One entry per loaded series, including empty ones.
    pub series: Vec<SeriesSummary>,
    pub failures: Vec<FileFailure>,
    pub outcome: RunOutcome,
    /// Chart description when one was rendered.
    #[serde(skip)]
    pub chart: Option<ComparisonChart>,
}

/// Runs the whole pipeline described by `config`.
///
/// Per-row and per-file problems are absorbed into the report. Only invalid
/// options, an unreadable search directory, or a failure while writing the
/// image produce an `Err`.
pub fn run(config: &PipelineConfig) -> Result<RunReport> {
    config.chart.validate()?;

    let sources = collect_sources(&config.source)?;
    let source_paths: Vec<PathBuf> = sources
        .iter()
        .map(|s| s.source_path().to_path_buf())
        .collect();
    if sources.is_empty() {
        info!("no trace files found; nothing to do");
        return Ok(RunReport {
            sources: source_paths,
            series: Vec::new(),
            failures: Vec::new(),
            outcome: RunOutcome::NoTraces,
            chart: None,
        });
    }

    let (series, failures) = load_all(&sources, &config.load);
    let summaries = series.iter().map(ConvergenceSeries::summary).collect();

    let (outcome, chart) = match render(&series, &config.chart) {
        Ok(chart) => (
            RunOutcome::Rendered {
                output: config.chart.output.clone(),
            },
            Some(chart),
        ),
        Err(TraceError::NothingToPlot) => {
            warn!(
                "nothing to plot: {} source(s), {} series, none with a valid point",
                sources.len(),
                series.len()
            );
            (RunOutcome::NothingToPlot, None)
        }
        Err(err) => return Err(err),
    };

    Ok(RunReport {
        sources: source_paths,
        series: summaries,
        failures,
        outcome,
        chart,
    })
}

/// Turns the configured source into loadable series sources.
pub fn collect_sources(source: &SourceConfig) -> Result<Vec<Box<dyn SeriesSource>>> {
    match source {
        SourceConfig::Directory { directory, pattern } => {
            let traces = discover_traces(directory, pattern)?;
            Ok(traces
                .into_iter()
                .map(|t| Box::new(t) as Box<dyn SeriesSource>)
                .collect())
        }
        SourceConfig::Wide { file, labels } => {
            let wide: Box<dyn SeriesSource> =
                Box::new(WideTraceFile::new(file.clone()).with_labels(labels.clone()));
            Ok(vec![wide])
        }
    }
}

/// Loads every source independently; failures are logged and collected.
pub fn load_all(
    sources: &[Box<dyn SeriesSource>],
    options: &LoadOptions,
) -> (Vec<ConvergenceSeries>, Vec<FileFailure>) {
    let mut series = Vec::new();
    let mut failures = Vec::new();
    for source in sources {
        match source.load(options) {
            Ok(loaded) => series.extend(loaded),
            Err(err) => {
                warn!("skipping {}: {err}", source.source_path().display());
                failures.push(FileFailure {
                    path: source.source_path().to_path_buf(),
                    message: err.to_string(),
                });
            }
        }
    }
    info!(
        "loaded {} series from {} source(s), {} failed",
        series.len(),
        sources.len(),
        failures.len()
    );
    (series, failures)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::discovery::TracePattern;

    #[test]
    fn empty_directory_is_reported_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::directory(dir.path(), TracePattern::default());
        let report = run(&config).unwrap();
        assert_eq!(report.outcome, RunOutcome::NoTraces);
        assert!(report.sources.is_empty());
    }

    #[test]
    fn bad_file_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("jacobi_convergence.csv"),
            "Iteration,Residual\n0,1\n1,0.5\n",
        )
        .unwrap();
        fs::write(dir.path().join("broken_convergence.csv"), "Step,Value\n0,1\n").unwrap();

        let config = PipelineConfig::directory(dir.path(), TracePattern::default());
        let report = run(&config).unwrap();

        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("Iteration"));
        assert_eq!(report.series.len(), 1);
        assert_eq!(report.outcome, RunOutcome::Rendered { output: None });
        assert_eq!(report.chart.unwrap().traces.len(), 1);
    }

    #[test]
    fn all_empty_series_end_in_nothing_to_plot() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("sor_convergence.csv"),
            "Iteration,Residual\n0,0\n1,-2\n",
        )
        .unwrap();
        let config = PipelineConfig::directory(dir.path(), TracePattern::default());
        let report = run(&config).unwrap();
        assert_eq!(report.outcome, RunOutcome::NothingToPlot);
        assert_eq!(report.series[0].skipped.non_positive, 2);
        assert!(report.chart.is_none());
    }
}

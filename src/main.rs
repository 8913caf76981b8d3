use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use convplot::discovery::TracePattern;
use convplot::loading::Delimiter;
use convplot::options::{PipelineConfig, SourceConfig};
use convplot::pipeline::{run, RunOutcome, RunReport};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Plot residual convergence traces of iterative solvers on a log scale",
    long_about = None
)]
struct Cli {
    /// TOML configuration file; the flags below override its values
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Directory searched (one level) for per-method trace files
    #[arg(long, value_hint = ValueHint::DirPath, conflicts_with = "wide")]
    dir: Option<PathBuf>,

    /// File name suffix of per-method trace files, e.g. `_convergence.csv`
    #[arg(long)]
    suffix: Option<String>,

    /// Single file with an `Iteration` column and one `Residual (<Method>)` column per method
    #[arg(long, value_hint = ValueHint::FilePath)]
    wide: Option<PathBuf>,

    /// Display label for a wide-file method, as METHOD=LABEL (repeatable)
    #[arg(long = "label", value_parser = parse_label)]
    labels: Vec<(String, String)>,

    /// Field separator: auto, comma, tab, semicolon or whitespace
    #[arg(long)]
    delimiter: Option<Delimiter>,

    /// Chart title
    #[arg(long)]
    title: Option<String>,

    /// Label of the iteration axis
    #[arg(long)]
    x_label: Option<String>,

    /// Label of the residual axis
    #[arg(long)]
    y_label: Option<String>,

    /// Image path (.png, .jpg, .bmp or .svg)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Output resolution in dots per inch
    #[arg(long)]
    dpi: Option<u32>,

    /// Figure width in inches
    #[arg(long)]
    width: Option<f64>,

    /// Figure height in inches
    #[arg(long)]
    height: Option<f64>,

    /// Open the chart in the system image viewer
    #[arg(long, action = ArgAction::SetTrue)]
    show: bool,

    /// Print the run report as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let json = cli.json;
    let config = build_config(cli)?;
    let report = run(&config).context("convergence plot failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(match report.outcome {
        RunOutcome::Rendered { .. } | RunOutcome::NoTraces => ExitCode::SUCCESS,
        RunOutcome::NothingToPlot => ExitCode::from(2),
    })
}

fn build_config(cli: Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(file) = cli.wide {
        config.source = SourceConfig::Wide {
            file,
            labels: BTreeMap::new(),
        };
    } else if let Some(directory) = cli.dir {
        let pattern = match config.source {
            SourceConfig::Directory { pattern, .. } => pattern,
            SourceConfig::Wide { .. } => TracePattern::default(),
        };
        config.source = SourceConfig::Directory { directory, pattern };
    }

    match &mut config.source {
        SourceConfig::Directory { pattern, .. } => {
            if let Some(suffix) = cli.suffix {
                *pattern = TracePattern::suffix(suffix);
            }
            if !cli.labels.is_empty() {
                bail!("--label only applies to a wide file (use --wide)");
            }
        }
        SourceConfig::Wide { labels, .. } => {
            if cli.suffix.is_some() {
                bail!("--suffix only applies to directory discovery (use --dir)");
            }
            labels.extend(cli.labels);
        }
    }

    if let Some(delimiter) = cli.delimiter {
        config.load.delimiter = delimiter;
    }

    let chart = &mut config.chart;
    if let Some(title) = cli.title {
        chart.title = title;
    }
    if let Some(x_label) = cli.x_label {
        chart.x_label = x_label;
    }
    if let Some(y_label) = cli.y_label {
        chart.y_label = y_label;
    }
    if let Some(output) = cli.output {
        chart.output = Some(output);
    }
    if let Some(dpi) = cli.dpi {
        chart.dpi = dpi;
    }
    if let Some(width) = cli.width {
        chart.width_in = width;
    }
    if let Some(height) = cli.height {
        chart.height_in = height;
    }
    if cli.show {
        chart.display = true;
    }
    // Without a destination the chart is at least shown.
    if chart.output.is_none() {
        chart.display = true;
    }

    Ok(config)
}

fn parse_label(value: &str) -> std::result::Result<(String, String), String> {
    let (method, label) = value
        .split_once('=')
        .ok_or_else(|| format!("expected METHOD=LABEL, found `{value}`"))?;
    let method = method.trim();
    if method.is_empty() {
        return Err(format!("missing method name in `{value}`"));
    }
    Ok((method.to_string(), label.trim().to_string()))
}

fn print_report(report: &RunReport) {
    for failure in &report.failures {
        println!("skipped {}: {}", failure.path.display(), failure.message);
    }
    for s in &report.series {
        let skipped = s.skipped.total();
        match (s.last_iteration, s.final_residual) {
            (Some(last), Some(residual)) => println!(
                "{}: {} point(s), last iteration {}, final residual {:.3e}{}",
                s.label,
                s.points,
                last,
                residual,
                if skipped > 0 {
                    format!(" ({skipped} row(s) skipped)")
                } else {
                    String::new()
                }
            ),
            _ => println!("{}: no valid points ({skipped} row(s) skipped)", s.label),
        }
    }
    match &report.outcome {
        RunOutcome::Rendered { output: Some(path) } => {
            println!("chart written to {}", path.display())
        }
        RunOutcome::Rendered { output: None } => println!("chart rendered"),
        RunOutcome::NoTraces => println!("No trace files found."),
        RunOutcome::NothingToPlot => println!("Nothing to plot: every series was empty."),
    }
}

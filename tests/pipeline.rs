use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use convplot::discovery::TracePattern;
use convplot::options::{ChartOptions, PipelineConfig};
use convplot::pipeline::{run, RunOutcome};
use convplot::{render, ConvergenceSeries, TraceError};

fn write_three_methods(dir: &Path) {
    fs::write(
        dir.join("jacobi_convergence.csv"),
        "Iteration,Residual\n0,1.0\n1,0.5\n2,0.25\n",
    )
    .unwrap();
    fs::write(
        dir.join("gauss-seidel_convergence.csv"),
        "Iteration,Residual\n0,1.0\n1,0.2\n2,0.04\n",
    )
    .unwrap();
    fs::write(
        dir.join("sor_convergence.csv"),
        "Iteration,Residual\n0,1.0\n1,0.05\n2,0.0025\n",
    )
    .unwrap();
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Three narrow files, one per method, end up as three labelled traces.
#[test]
fn directory_of_traces_renders_every_method() {
    let dir = tempfile::tempdir().unwrap();
    write_three_methods(dir.path());
    fs::write(dir.path().join("notes.txt"), "not a trace").unwrap();

    let config = PipelineConfig::directory(dir.path(), TracePattern::suffix("*_convergence.csv"));
    let report = run(&config).unwrap();

    assert_eq!(report.outcome, RunOutcome::Rendered { output: None });
    assert!(report.failures.is_empty());
    let chart = report.chart.expect("chart laid out");
    let mut pairs: Vec<(String, Vec<(u64, f64)>)> = chart
        .traces
        .iter()
        .map(|t| (t.label.clone(), t.points.clone()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(pairs.len(), 3);
    assert_eq!(pairs[0].0, "gauss-seidel");
    assert_eq!(pairs[1].0, "jacobi");
    assert_eq!(pairs[2].0, "sor");
    assert_relative_eq!(pairs[2].1[2].1, 0.0025);
    for (_, points) in &pairs {
        assert!(points.windows(2).all(|w| w[0].0 < w[1].0 && w[1].1 < w[0].1));
    }
}

/// The wide layout produces the same kind of series, with configured labels.
#[test]
fn wide_file_with_label_override() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("Convergence_Data.csv");
    fs::write(
        &data,
        "Iteration,Residual (Jacobi),Residual (Gauss-Seidel),Residual (SOR)\n\
         0,1.0,1.0,1.0\n\
         1,0.5,0.2,0\n\
         2,0.25,0.04,0.0025\n",
    )
    .unwrap();

    let mut labels = BTreeMap::new();
    labels.insert("SOR".to_string(), "SOR (1.7)".to_string());
    let report = run(&PipelineConfig::wide(&data, labels)).unwrap();

    let chart = report.chart.expect("chart laid out");
    let labels: Vec<&str> = chart.traces.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(labels, vec!["Jacobi", "Gauss-Seidel", "SOR (1.7)"]);
    // The zero residual at iteration 1 is dropped; its neighbours remain.
    assert_eq!(chart.traces[2].points, vec![(0, 1.0), (2, 0.0025)]);
    assert_eq!(report.series[2].skipped.non_positive, 1);
}

/// Identical inputs give identical series data and labels.
#[test]
fn reruns_are_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    write_three_methods(dir.path());
    let config = PipelineConfig::directory(dir.path(), TracePattern::default());

    let first = run(&config).unwrap();
    let second = run(&config).unwrap();
    assert_eq!(first, second);
}

/// A rendered SVG lands at the requested path with no staging file left behind.
#[test]
fn svg_output_lands_at_the_requested_path() {
    let dir = tempfile::tempdir().unwrap();
    write_three_methods(dir.path());
    let output = dir.path().join("convergence.svg");
    let config = PipelineConfig::directory(dir.path(), TracePattern::default())
        .with_chart(ChartOptions::default().with_output(&output).with_size(6.4, 4.8));

    let report = run(&config).unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::Rendered {
            output: Some(output.clone())
        }
    );
    let svg = fs::read_to_string(&output).unwrap();
    assert!(svg.contains("<svg"));
    assert_eq!(
        file_names(dir.path()),
        vec![
            "convergence.svg",
            "gauss-seidel_convergence.csv",
            "jacobi_convergence.csv",
            "sor_convergence.csv"
        ]
    );
}

/// A PNG is written at the figure size times the requested resolution.
#[test]
fn png_output_has_the_requested_pixel_size() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("x.png");
    let series = vec![
        ConvergenceSeries::from_points("jacobi", vec![(0, 1.0), (1, 0.5), (2, 0.25)]),
        ConvergenceSeries::from_points("gauss-seidel", vec![(0, 1.0), (1, 0.2), (2, 0.04)]),
        ConvergenceSeries::from_points("sor", vec![(0, 1.0), (1, 0.05), (2, 0.0025)]),
    ];
    let options = ChartOptions::default().with_dpi(50).with_output(&output);

    let chart = render(&series, &options).unwrap();
    assert_eq!(chart.traces.len(), 3);

    let bytes = fs::read(&output).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    assert_eq!((width, height), (500, 500));

    let names = file_names(dir.path());
    assert_eq!(names, vec!["x.png"]);
    assert!(names.iter().all(|n| !n.contains(".convplot-")));
}

/// Writing into a directory that does not exist fails cleanly.
#[test]
fn unwritable_destination_is_a_render_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("missing").join("plot.png");
    let series = vec![ConvergenceSeries::from_points(
        "jacobi",
        vec![(0, 1.0), (1, 0.5)],
    )];
    let options = ChartOptions::default().with_output(&output);

    let err = render(&series, &options).unwrap_err();
    assert!(matches!(err, TraceError::Render { .. }));
    assert!(!output.exists());
    assert!(file_names(dir.path()).is_empty());
}

/// Unknown image extensions are rejected before anything is drawn.
#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_three_methods(dir.path());
    let config = PipelineConfig::directory(dir.path(), TracePattern::default())
        .with_chart(ChartOptions::default().with_output(dir.path().join("plot.pdf")));

    assert!(matches!(run(&config), Err(TraceError::InvalidOptions { .. })));
    assert_eq!(file_names(dir.path()).len(), 3);
}

/// Files that exist but hold no valid rows end in "nothing to plot" without an image.
#[test]
fn nothing_to_plot_produces_no_image() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("jacobi_convergence.csv"),
        "Iteration,Residual\n0,0\n1,nan\n",
    )
    .unwrap();
    fs::write(dir.path().join("sor_convergence.csv"), "Iteration,Residual\n").unwrap();
    let output = dir.path().join("plot.png");
    let config = PipelineConfig::directory(dir.path(), TracePattern::default())
        .with_chart(ChartOptions::default().with_output(&output));

    let report = run(&config).unwrap();
    assert_eq!(report.outcome, RunOutcome::NothingToPlot);
    assert_eq!(report.series.len(), 2);
    assert!(!output.exists());
}

/// The native solver's space-separated output loads through a TOML config.
#[test]
fn toml_config_drives_a_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("Jacobi_convergenceRates.csv"),
        "Iteration Residual\n0 3.2\n1 1.1\n2 0.4\n",
    )
    .unwrap();
    let text = format!(
        "[source]\nkind = \"directory\"\ndirectory = {:?}\npattern = \"_convergenceRates.csv\"\n\n\
         [chart]\ntitle = \"Parallel Jacobi\"\n",
        dir.path().display().to_string()
    );
    let config = PipelineConfig::from_toml_str(&text).unwrap();

    let report = run(&config).unwrap();
    let chart = report.chart.expect("chart laid out");
    assert_eq!(chart.title, "Parallel Jacobi");
    assert_eq!(chart.traces[0].label, "Jacobi");
    assert_eq!(chart.traces[0].points.len(), 3);
}

//! Comparative chart of several convergence series on a log-scaled residual axis.
//!
//! [`ComparisonChart::build`] turns the loaded series into a plain description
//! of what will be drawn (traces, markers, colours, axis ranges, grid lines).
//! [`render`] then draws that description with `plotters` and writes it to the
//! requested image file and/or hands it to the system viewer.

use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process;

use log::{info, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use serde::Serialize;

use crate::error::{Result, TraceError};
use crate::options::ChartOptions;
use crate::series::ConvergenceSeries;
use crate::viewer;

/// Marker shapes, assigned to series in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Marker {
    Circle,
    Square,
    Triangle,
    Cross,
    Diamond,
}

impl Marker {
    pub const CYCLE: [Marker; 5] = [
        Marker::Circle,
        Marker::Square,
        Marker::Triangle,
        Marker::Cross,
        Marker::Diamond,
    ];

    /// Marker of the `index`-th drawn series.
    pub fn for_index(index: usize) -> Self {
        Self::CYCLE[index % Self::CYCLE.len()]
    }
}

// Tableau 10, the usual default for line plots.
const PALETTE: [(u8, u8, u8); 10] = [
    (31, 119, 180),
    (255, 127, 14),
    (44, 160, 44),
    (214, 39, 40),
    (148, 103, 189),
    (140, 86, 75),
    (227, 119, 194),
    (127, 127, 127),
    (188, 189, 34),
    (23, 190, 207),
];

/// Closed interval covered by an axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

/// Positions of dashed grid lines along one axis.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GridLines {
    pub major: Vec<f64>,
    pub minor: Vec<f64>,
}

/// One series as it appears on the chart.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartTrace {
    pub label: String,
    pub marker: Marker,
    pub color: (u8, u8, u8),
    /// `(iteration, residual)` pairs in ascending iteration order.
    pub points: Vec<(u64, f64)>,
}

/// Everything needed to draw the comparison, independent of any backend.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComparisonChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub traces: Vec<ChartTrace>,
    /// Labels of series that had no valid point and were left out.
    pub omitted: Vec<String>,
    /// Linear iteration axis.
    pub x_range: AxisRange,
    /// Logarithmic residual axis, widened to whole decades.
    pub y_range: AxisRange,
}

impl ComparisonChart {
    /// Lays out the non-empty series; fails with [`TraceError::NothingToPlot`]
    /// when none is left.
    pub fn build(series: &[ConvergenceSeries], options: &ChartOptions) -> Result<Self> {
        let mut omitted = Vec::new();
        let mut drawn = Vec::new();
        for s in series {
            if s.is_empty() {
                warn!(
                    "series `{}` has no valid points ({} row(s) skipped); leaving it out",
                    s.label(),
                    s.skips().total()
                );
                omitted.push(s.label().to_string());
            } else {
                drawn.push(s);
            }
        }
        if drawn.is_empty() {
            return Err(TraceError::NothingToPlot);
        }

        let labels = unique_labels(drawn.iter().map(|s| s.label()));
        let traces: Vec<ChartTrace> = drawn
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(index, (s, label))| ChartTrace {
                label,
                marker: Marker::for_index(index),
                color: PALETTE[index % PALETTE.len()],
                points: s.points().iter().map(|p| (p.iteration, p.residual)).collect(),
            })
            .collect();

        let points = || traces.iter().flat_map(|t| t.points.iter());
        let x_min = points().map(|p| p.0).min().unwrap_or(0) as f64;
        let mut x_max = points().map(|p| p.0).max().unwrap_or(0) as f64;
        if x_max <= x_min {
            x_max = x_min + 1.0;
        }
        let r_min = points().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let r_max = points().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            title: options.title.clone(),
            x_label: options.x_label.clone(),
            y_label: options.y_label.clone(),
            traces,
            omitted,
            x_range: AxisRange {
                min: x_min,
                max: x_max,
            },
            y_range: decade_range(r_min, r_max),
        })
    }

    /// Major and minor grid positions on the iteration axis.
    pub fn x_grid(&self) -> GridLines {
        linear_grid(self.x_range, 10)
    }

    /// Decade and sub-decade grid positions on the residual axis.
    pub fn y_grid(&self) -> GridLines {
        log_grid(self.y_range)
    }

    /// Draws the chart onto any `plotters` drawing area.
    pub fn draw<DB: DrawingBackend>(
        &self,
        root: &DrawingArea<DB, Shift>,
        scale: f64,
    ) -> std::result::Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
        let px = |v: f64| (v * scale).round().max(1.0) as i32;
        let font =
            |size: f64| FontDesc::new(FontFamily::SansSerif, size * scale, FontStyle::Normal);

        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(root)
            .caption(&self.title, font(24.0))
            .margin(px(20.0))
            .x_label_area_size(px(50.0))
            .y_label_area_size(px(80.0))
            .build_cartesian_2d(
                self.x_range.min..self.x_range.max,
                (self.y_range.min..self.y_range.max).log_scale(),
            )?;

        // Built-in mesh lines are solid, so the grid is drawn below as dashed series.
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(self.x_label.as_str())
            .y_desc(self.y_label.as_str())
            .x_label_formatter(&|v| format!("{:.0}", v))
            .y_label_formatter(&|v| format!("{:.0e}", v))
            .label_style(font(14.0))
            .axis_desc_style(font(16.0))
            .draw()?;

        let (x_lo, x_hi) = (self.x_range.min, self.x_range.max);
        let (y_lo, y_hi) = (self.y_range.min, self.y_range.max);
        let dash = px(4.0) as u32;
        let gap = px(3.0) as u32;
        let thin = px(0.5) as u32;
        let minor_style = BLACK.mix(0.08).stroke_width(thin);
        let major_style = BLACK.mix(0.2).stroke_width(thin);
        let x_grid = self.x_grid();
        let y_grid = self.y_grid();
        for (lines, style) in [(&x_grid.minor, minor_style), (&x_grid.major, major_style)] {
            for &x in lines {
                chart.draw_series(DashedLineSeries::new(
                    vec![(x, y_lo), (x, y_hi)],
                    dash,
                    gap,
                    style,
                ))?;
            }
        }
        for (lines, style) in [(&y_grid.minor, minor_style), (&y_grid.major, major_style)] {
            for &y in lines {
                chart.draw_series(DashedLineSeries::new(
                    vec![(x_lo, y), (x_hi, y)],
                    dash,
                    gap,
                    style,
                ))?;
            }
        }

        let line_width = px(2.0) as u32;
        let m = px(4.0);
        for trace in &self.traces {
            let (r, g, b) = trace.color;
            let color = RGBColor(r, g, b);
            let points: Vec<(f64, f64)> = trace
                .points
                .iter()
                .map(|&(iteration, residual)| (iteration as f64, residual))
                .collect();

            chart
                .draw_series(LineSeries::new(
                    points.iter().copied(),
                    color.stroke_width(line_width),
                ))?
                .label(trace.label.as_str())
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x - 12, y), (x + 12, y)], color.stroke_width(line_width))
                });

            let at = points.iter().copied();
            match trace.marker {
                Marker::Circle => {
                    chart.draw_series(at.map(|p| Circle::new(p, m, color.filled())))?;
                }
                Marker::Square => {
                    chart.draw_series(at.map(|p| {
                        EmptyElement::at(p) + Rectangle::new([(-m, -m), (m, m)], color.filled())
                    }))?;
                }
                Marker::Triangle => {
                    chart.draw_series(at.map(|p| TriangleMarker::new(p, m + 1, color.filled())))?;
                }
                Marker::Cross => {
                    chart.draw_series(
                        at.map(|p| Cross::new(p, m, color.stroke_width(line_width))),
                    )?;
                }
                Marker::Diamond => {
                    chart.draw_series(at.map(|p| {
                        EmptyElement::at(p)
                            + Polygon::new(
                                vec![(0, -m - 1), (m + 1, 0), (0, m + 1), (-m - 1, 0)],
                                color.filled(),
                            )
                    }))?;
                }
            }
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(font(14.0))
            .draw()?;

        root.present()?;
        Ok(())
    }
}

/// Lays out `series`, writes the chart to `options.output` if set and opens it
/// in a viewer if `options.display` is set.
///
/// Empty series are reported and skipped. When no series has a point the
/// result is [`TraceError::NothingToPlot`] and no file is touched.
pub fn render(series: &[ConvergenceSeries], options: &ChartOptions) -> Result<ComparisonChart> {
    options.validate()?;
    let chart = ComparisonChart::build(series, options)?;

    if let Some(path) = &options.output {
        write_image(&chart, path, options)?;
        info!(
            "wrote {} series to {} ({}x{} px)",
            chart.traces.len(),
            path.display(),
            options.pixel_size().0,
            options.pixel_size().1
        );
    }

    if options.display {
        let shown = match &options.output {
            Some(path) => path.clone(),
            None => {
                let scratch = viewer::scratch_path();
                write_image(&chart, &scratch, options)?;
                scratch
            }
        };
        if let Err(err) = viewer::open_in_viewer(&shown) {
            warn!("could not open a viewer for {}: {err}", shown.display());
        }
    }

    Ok(chart)
}

/// Image encodings selected from the output extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Svg,
    Bitmap,
}

impl ImageFormat {
    /// Chooses the backend for `path`; unknown extensions are rejected.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("svg") => Ok(ImageFormat::Svg),
            Some("png" | "bmp" | "jpg" | "jpeg") => Ok(ImageFormat::Bitmap),
            _ => Err(TraceError::invalid_options(format!(
                "cannot tell the image format of `{}` (use .png, .jpg, .bmp or .svg)",
                path.display()
            ))),
        }
    }
}

/// Draws into a sibling staging file and renames it over `path` once complete.
pub fn write_image(chart: &ComparisonChart, path: &Path, options: &ChartOptions) -> Result<()> {
    let format = ImageFormat::from_path(path)?;
    let staging = staging_path(path);
    let size = options.pixel_size();
    let scale = options.scale();

    let drawn = panic::catch_unwind(AssertUnwindSafe(|| match format {
        ImageFormat::Svg => {
            let root = SVGBackend::new(&staging, size).into_drawing_area();
            chart.draw(&root, scale).map_err(|e| e.to_string())
        }
        ImageFormat::Bitmap => {
            let root = BitMapBackend::new(&staging, size).into_drawing_area();
            chart.draw(&root, scale).map_err(|e| e.to_string())
        }
    }))
    .unwrap_or_else(|_| Err("plotting backend panicked".to_string()));

    match drawn {
        Ok(()) => fs::rename(&staging, path).map_err(|e| {
            let _ = fs::remove_file(&staging);
            TraceError::io(path, e)
        }),
        Err(message) => {
            let _ = fs::remove_file(&staging);
            Err(TraceError::render(path, message))
        }
    }
}

/// `dir/.name.convplot-<pid>.ext`; keeps the extension so the encoder is unchanged.
fn staging_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chart".to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!(".{stem}.convplot-{}.{ext}", process::id());
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn unique_labels<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    labels
        .map(|label| {
            let count = seen.entry(label).or_insert(0);
            *count += 1;
            if *count == 1 {
                label.to_string()
            } else {
                format!("{label} ({count})")
            }
        })
        .collect()
}

/// Smallest whole-decade interval containing `[lo, hi]`.
/// Subnormal or near-overflow residuals clamp to `lo` and `f64::MAX`.
fn decade_range(lo: f64, hi: f64) -> AxisRange {
    let floor = 10f64.powf(lo.log10().floor());
    let min = if floor > 0.0 { floor.min(lo) } else { lo };
    let mut max = 10f64.powf(hi.log10().ceil()).min(f64::MAX).max(hi);
    if max <= min {
        max = (min * 10.0).min(f64::MAX);
    }
    AxisRange { min, max }
}

/// 1-2-5 tick spacing with roughly `target` major lines; minor lines only at
/// whole iterations.
fn linear_grid(range: AxisRange, target: usize) -> GridLines {
    let span = range.max - range.min;
    if !(span > 0.0) || target == 0 {
        return GridLines::default();
    }
    let raw = span / target as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let leading = match raw / magnitude {
        n if n <= 1.0 => 1.0,
        n if n <= 2.0 => 2.0,
        n if n <= 5.0 => 5.0,
        _ => 10.0,
    };
    let step = (leading * magnitude).max(1.0);
    let minor_step = match leading as u32 {
        2 => step / 2.0,
        _ => step / 5.0,
    };

    let eps = step * 1e-9;
    let multiples = |step: f64| {
        let first = (range.min / step).ceil() as i64;
        let last = ((range.max + eps) / step).floor() as i64;
        (first..=last).map(move |k| k as f64 * step)
    };
    let major: Vec<f64> = multiples(step).collect();
    let minor = if minor_step >= 1.0 {
        multiples(minor_step)
            .filter(|v| major.iter().all(|m| (m - v).abs() > eps))
            .collect()
    } else {
        Vec::new()
    };
    GridLines { major, minor }
}

/// Lines at each decade and at 2..9 times each decade.
fn log_grid(range: AxisRange) -> GridLines {
    let mut lines = GridLines::default();
    if !(range.min > 0.0 && range.max > range.min) {
        return lines;
    }
    let within = |v: f64| v >= range.min * (1.0 - 1e-9) && v <= range.max * (1.0 + 1e-9);
    let first = range.min.log10().floor() as i32;
    let last = range.max.log10().ceil() as i32;
    for k in first..=last {
        let decade = 10f64.powi(k);
        if within(decade) {
            lines.major.push(decade);
        }
        for m in 2..=9 {
            let v = m as f64 * decade;
            if within(v) {
                lines.minor.push(v);
            }
        }
    }
    lines
}

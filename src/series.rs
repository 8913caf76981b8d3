//! Convergence series and the per-row validation that produces them.

use serde::Serialize;

/// One accepted sample of a residual trace.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ResidualPoint {
    /// Iteration index reported by the solver.
    pub iteration: u64,
    /// Residual magnitude, always finite and strictly positive.
    pub residual: f64,
}

/// Why a row was left out of a series.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The iteration or residual field is absent or blank.
    Missing,
    /// A field is present but is not a number (or the iteration is not a
    /// non-negative integer).
    Unparsable,
    /// The residual is zero or negative and cannot sit on a log axis.
    NonPositive,
    /// The residual is NaN or infinite.
    NonFinite,
    /// The iteration already appeared earlier in the file.
    Duplicate,
}

/// Counters for rows that were skipped while building a series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RowSkips {
    pub missing: usize,
    pub unparsable: usize,
    pub non_positive: usize,
    pub non_finite: usize,
    pub duplicate: usize,
}

impl RowSkips {
    /// Records one skipped row.
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Missing => self.missing += 1,
            SkipReason::Unparsable => self.unparsable += 1,
            SkipReason::NonPositive => self.non_positive += 1,
            SkipReason::NonFinite => self.non_finite += 1,
            SkipReason::Duplicate => self.duplicate += 1,
        }
    }

    /// Total number of skipped rows.
    pub fn total(&self) -> usize {
        self.missing + self.unparsable + self.non_positive + self.non_finite + self.duplicate
    }
}

/// A single method's convergence trace, ready for plotting.
///
/// Points are sorted by ascending iteration, iterations are unique and every
/// residual is finite and strictly positive. A series may be empty when the
/// source had no valid rows; such series are reported but never drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceSeries {
    label: String,
    points: Vec<ResidualPoint>,
    skips: RowSkips,
}

impl ConvergenceSeries {
    /// Builds a series from raw `(iteration, residual)` pairs, applying the same
    /// validation as the file loaders.
    pub fn from_points<I>(label: impl Into<String>, points: I) -> Self
    where
        I: IntoIterator<Item = (u64, f64)>,
    {
        let mut builder = SeriesBuilder::new(label);
        for (iteration, residual) in points {
            builder.push_value(iteration, residual);
        }
        builder.build()
    }

    /// Display label of the method.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Accepted points, sorted by iteration.
    pub fn points(&self) -> &[ResidualPoint] {
        &self.points
    }

    /// Number of accepted points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no row survived validation.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rows dropped while building the series.
    pub fn skips(&self) -> &RowSkips {
        &self.skips
    }

    /// Residual at the last recorded iteration.
    pub fn final_residual(&self) -> Option<f64> {
        self.points.last().map(|p| p.residual)
    }

    /// Ratio of the last residual to the first one.
    pub fn reduction(&self) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        Some(last.residual / first.residual)
    }

    /// Compact description used in run reports.
    pub fn summary(&self) -> SeriesSummary {
        SeriesSummary {
            label: self.label.clone(),
            points: self.points.len(),
            skipped: self.skips,
            first_iteration: self.points.first().map(|p| p.iteration),
            last_iteration: self.points.last().map(|p| p.iteration),
            final_residual: self.final_residual(),
        }
    }
}

/// Per-series line of a run report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub label: String,
    pub points: usize,
    pub skipped: RowSkips,
    pub first_iteration: Option<u64>,
    pub last_iteration: Option<u64>,
    pub final_residual: Option<f64>,
}

/// Accumulates rows for one series and validates each as it arrives.
#[derive(Debug)]
pub struct SeriesBuilder {
    label: String,
    points: Vec<ResidualPoint>,
    skips: RowSkips,
}

impl SeriesBuilder {
    /// Starts an empty series with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            points: Vec::new(),
            skips: RowSkips::default(),
        }
    }

    /// Validates one textual row; returns the reason when the row is skipped.
    pub fn push_row(
        &mut self,
        iteration: Option<&str>,
        residual: Option<&str>,
    ) -> Option<SkipReason> {
        let outcome = parse_iteration(iteration)
            .and_then(|iteration| parse_residual(residual).map(|residual| (iteration, residual)));
        match outcome {
            Ok((iteration, residual)) => {
                self.points.push(ResidualPoint {
                    iteration,
                    residual,
                });
                None
            }
            Err(reason) => {
                self.skips.record(reason);
                Some(reason)
            }
        }
    }

    /// Validates an already-numeric row.
    pub fn push_value(&mut self, iteration: u64, residual: f64) -> Option<SkipReason> {
        match check_residual(residual) {
            Ok(residual) => {
                self.points.push(ResidualPoint {
                    iteration,
                    residual,
                });
                None
            }
            Err(reason) => {
                self.skips.record(reason);
                Some(reason)
            }
        }
    }

    /// Sorts by iteration, drops repeated iterations and finalises the series.
    pub fn build(mut self) -> ConvergenceSeries {
        // Stable sort keeps the first occurrence of a repeated iteration in front.
        self.points.sort_by_key(|p| p.iteration);
        let before = self.points.len();
        self.points.dedup_by_key(|p| p.iteration);
        self.skips.duplicate += before - self.points.len();

        ConvergenceSeries {
            label: self.label,
            points: self.points,
            skips: self.skips,
        }
    }
}

fn parse_iteration(field: Option<&str>) -> Result<u64, SkipReason> {
    let text = non_blank(field)?;
    if let Ok(value) = text.parse::<u64>() {
        return Ok(value);
    }
    // Some writers emit integral iterations as floats ("12.0").
    match text.parse::<f64>() {
        Ok(value)
            if value.is_finite()
                && value >= 0.0
                && value.fract() == 0.0
                && value <= u64::MAX as f64 =>
        {
            Ok(value as u64)
        }
        _ => Err(SkipReason::Unparsable),
    }
}

fn parse_residual(field: Option<&str>) -> Result<f64, SkipReason> {
    let text = non_blank(field)?;
    let value = text.parse::<f64>().map_err(|_| SkipReason::Unparsable)?;
    check_residual(value)
}

fn check_residual(value: f64) -> Result<f64, SkipReason> {
    if !value.is_finite() {
        Err(SkipReason::NonFinite)
    } else if value <= 0.0 {
        Err(SkipReason::NonPositive)
    } else {
        Ok(value)
    }
}

fn non_blank(field: Option<&str>) -> Result<&str, SkipReason> {
    match field.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(SkipReason::Missing),
    }
}

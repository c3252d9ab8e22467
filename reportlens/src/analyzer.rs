//! Report analysis.
//!
//! [`SummaryAnalyzer`] reduces a report's metrics to summary statistics.
//!
//! Precision policy: all arithmetic is done in `f64` over the unrounded
//! metric values in name order. Each figure in the resulting [`Analysis`] is
//! then rounded half away from zero to `precision` decimal places (default
//! [`DEFAULT_PRECISION`]). The standard deviation is the population one.
//!
//! Values whose magnitude leaves no fractional digits at the requested
//! precision (at or above 2^53 once scaled) are reported unrounded. When the
//! direct sum or variance of finite metrics overflows, mean and standard
//! deviation are recomputed on values scaled by the largest magnitude, so
//! they stay finite. A sum that is not representable saturates at
//! `±f64::MAX`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;

use crate::report::StructuredReport;

/// Decimal places kept when none is configured.
pub const DEFAULT_PRECISION: u32 = 4;

/// Largest supported precision; beyond this `f64` has no digits left to keep.
pub const MAX_PRECISION: u32 = 12;

/// Computes an [`Analysis`] from a report.
///
/// Implementations must be deterministic and side-effect free.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, report: &StructuredReport) -> Analysis;
}

/// Result of analyzing one report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub source: String,
    pub report_timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub metric_count: usize,
    pub attribute_count: usize,
    pub stats: Option<MetricStats>,
    pub highest: Option<MetricValue>,
    pub lowest: Option<MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats {
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub name: String,
    pub value: f64,
}

/// Default analyzer: summary statistics over all metrics.
#[derive(Debug, Clone, Copy)]
pub struct SummaryAnalyzer {
    precision: u32,
}

impl Default for SummaryAnalyzer {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
        }
    }
}

impl SummaryAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set decimal places kept in results, capped at [`MAX_PRECISION`].
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision.min(MAX_PRECISION);
        self
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    fn round(&self, value: f64) -> f64 {
        round_to(value, self.precision)
    }
}

/// Values at or above this magnitude have no fractional part in `f64`.
const INTEGRAL_THRESHOLD: f64 = 9_007_199_254_740_992.0;

/// Round half away from zero to `decimals` places.
///
/// Non-finite input and values too large to carry fractional digits at
/// this precision are returned unchanged.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = value * factor;
    if !scaled.is_finite() || scaled.abs() >= INTEGRAL_THRESHOLD {
        return value;
    }
    let rounded = scaled.round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

impl Analyzer for SummaryAnalyzer {
    fn analyze(&self, report: &StructuredReport) -> Analysis {
        let values: Vec<f64> = report.metrics.values().copied().collect();

        let stats = (!values.is_empty()).then(|| {
            let moments = Moments::of(&values);
            MetricStats {
                sum: self.round(moments.sum),
                mean: self.round(moments.mean),
                min: self.round(values.iter().copied().fold(f64::INFINITY, f64::min)),
                max: self.round(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                std_dev: self.round(moments.std_dev),
            }
        });

        // Metrics iterate in name order, so keeping the first extreme seen
        // breaks ties towards the smallest name.
        let mut highest: Option<(&String, f64)> = None;
        let mut lowest: Option<(&String, f64)> = None;
        for (name, &value) in &report.metrics {
            if highest.map_or(true, |(_, v)| value > v) {
                highest = Some((name, value));
            }
            if lowest.map_or(true, |(_, v)| value < v) {
                lowest = Some((name, value));
            }
        }
        let to_metric = |(name, value): (&String, f64)| MetricValue {
            name: name.clone(),
            value: self.round(value),
        };

        Analysis {
            source: report.source.clone(),
            report_timestamp: report.timestamp,
            title: report.title.clone(),
            metric_count: report.metrics.len(),
            attribute_count: report.attributes.len(),
            stats,
            highest: highest.map(to_metric),
            lowest: lowest.map(to_metric),
        }
    }
}

struct Moments {
    sum: f64,
    mean: f64,
    std_dev: f64,
}

impl Moments {
    /// Sum, mean and population standard deviation of non-empty finite values.
    fn of(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let sum: f64 = values.iter().sum();
        let mean = sum / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        if sum.is_finite() && variance.is_finite() {
            return Self {
                sum,
                mean,
                std_dev: variance.sqrt(),
            };
        }

        let scale = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let scaled_sum: f64 = values.iter().map(|v| v / scale).sum();
        let scaled_mean = scaled_sum / n;
        let scaled_variance = values
            .iter()
            .map(|v| (v / scale - scaled_mean).powi(2))
            .sum::<f64>()
            / n;
        Self {
            sum: (scaled_sum * scale).clamp(-f64::MAX, f64::MAX),
            mean: scaled_mean * scale,
            std_dev: scaled_variance.sqrt() * scale,
        }
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Report:     {}", self.source)?;
        if let Some(title) = &self.title {
            writeln!(f, "Title:      {}", title)?;
        }
        writeln!(
            f,
            "Timestamp:  {}",
            self.report_timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )?;
        writeln!(f, "Metrics:    {}", self.metric_count)?;
        write!(f, "Attributes: {}", self.attribute_count)?;

        if let Some(stats) = &self.stats {
            writeln!(f)?;
            writeln!(f, "Sum:        {}", stats.sum)?;
            writeln!(f, "Mean:       {}", stats.mean)?;
            writeln!(f, "Min:        {}", stats.min)?;
            writeln!(f, "Max:        {}", stats.max)?;
            write!(f, "Std dev:    {}", stats.std_dev)?;
        }
        if let Some(highest) = &self.highest {
            write!(f, "\nHighest:    {} = {}", highest.name, highest.value)?;
        }
        if let Some(lowest) = &self.lowest {
            write!(f, "\nLowest:     {} = {}", lowest.name, lowest.value)?;
        }
        Ok(())
    }
}

//! Descriptive statistics over one windowed series field.

use std::collections::HashMap;

use ndarray::Array1;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::EnvironmentalSample;

/// Selects one measured field of an [`EnvironmentalSample`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    #[serde(rename = "pressure")]
    Pressure,
    #[serde(rename = "seaSurfaceTemperature")]
    SeaSurfaceTemperature,
    #[serde(rename = "submergence")]
    Submergence,
}

impl Field {
    pub const ALL: [Field; 3] = [
        Field::Pressure,
        Field::SeaSurfaceTemperature,
        Field::Submergence,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Pressure => "pressure",
            Field::SeaSurfaceTemperature => "seaSurfaceTemperature",
            Field::Submergence => "submergence",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        match name.trim() {
            "pressure" => Some(Field::Pressure),
            "seaSurfaceTemperature" => Some(Field::SeaSurfaceTemperature),
            "submergence" => Some(Field::Submergence),
            _ => None,
        }
    }

    pub fn value_of(&self, sample: &EnvironmentalSample) -> Option<f64> {
        match self {
            Field::Pressure => sample.pressure,
            Field::SeaSurfaceTemperature => sample.sea_surface_temperature,
            Field::Submergence => sample.submergence,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary of one non-empty numeric sample. Population divisors throughout.
///
/// `skewness` and `kurtosis` are `None` for a zero-variance sample: the
/// standardized moments divide by the standard deviation, and a tagged
/// absence keeps the NaN from leaking into downstream aggregation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSummary {
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
    pub std_dev: f64,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
}

/// Compute the summary battery over `values`, or `None` when empty.
///
/// Callers are expected to have projected the values through
/// [`field_values`], so NaN never reaches the ordering or the moments.
pub fn summarize(values: &[f64]) -> Option<StatisticsSummary> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let sample = Array1::from_vec(values.to_vec());
    let mean = sample.sum() / n;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    let mode = mode_first_to_peak(values);

    let variance = sample.mapv(|v| (v - mean).powi(2)).sum() / n;
    let std_dev = variance.sqrt();

    let (skewness, kurtosis) = if std_dev > 0.0 {
        let standardized = sample.mapv(|v| (v - mean) / std_dev);
        let skewness = standardized.mapv(|z| z.powi(3)).sum() / n;
        let kurtosis = standardized.mapv(|z| z.powi(4)).sum() / n - 3.0;
        (Some(skewness), Some(kurtosis))
    } else {
        (None, None)
    };

    Some(StatisticsSummary {
        mean,
        median,
        mode,
        std_dev,
        skewness,
        kurtosis,
    })
}

// Single left-to-right scan; on a tie the first value to reach the winning
// count stays the mode.
fn mode_first_to_peak(values: &[f64]) -> f64 {
    let mut counts: HashMap<OrderedFloat<f64>, usize> = HashMap::new();
    let mut best = values[0];
    let mut best_count = 0usize;
    for &value in values {
        let count = counts.entry(OrderedFloat(value)).or_insert(0);
        *count += 1;
        if *count > best_count {
            best_count = *count;
            best = value;
        }
    }
    best
}

/// Project one field out of a sample sequence, keeping numeric non-NaN
/// values only and preserving input order.
pub fn field_values(samples: &[EnvironmentalSample], field: Field) -> Vec<f64> {
    samples
        .iter()
        .filter_map(|sample| field.value_of(sample))
        .filter(|value| !value.is_nan())
        .collect()
}

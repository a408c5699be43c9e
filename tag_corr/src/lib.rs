//! Core track/environment correlation library for the tag track viewer.
//!
//! Consumes two in-memory record streams (position fixes and environmental
//! samples), resolves a symmetric time window around a selected fix, filters
//! the series to that window, and summarizes each measured field. Map and
//! chart rendering and HTTP retrieval live outside this crate.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub mod stats;
pub mod timeline;

pub use stats::{field_values, summarize, Field, StatisticsSummary};
pub use timeline::{
    filter_by_key, group_key, parse_instant, resolve_window, unique_keys, Granularity,
};

#[derive(Error, Debug)]
pub enum CorrError {
    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse CSV input: {0}")]
    CsvParse(String),
    #[error("failed to parse JSON input: {0}")]
    JsonParse(String),
    #[error("insufficient data for correlation")]
    InsufficientData,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// One reported device location plus its observation time.
///
/// `fix_time` and `obs_time` are parsed independently; neither is guaranteed
/// to precede the other.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFix {
    pub lat: f64,
    pub lon: f64,
    pub fix_time: NaiveDateTime,
    pub obs_time: NaiveDateTime,
}

impl PositionFix {
    /// Rounded minutes from observation to fix; negative when the fix
    /// nominally precedes the observation.
    pub fn latency_minutes(&self) -> i64 {
        let delta = self.fix_time - self.obs_time;
        (delta.num_seconds() as f64 / 60.0).round() as i64
    }
}

/// One environmental sample. A `None` field is missing data, distinct from a
/// measured zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalSample {
    pub time: NaiveDateTime,
    pub pressure: Option<f64>,
    pub sea_surface_temperature: Option<f64>,
    pub submergence: Option<f64>,
}

/// Inclusive time range, `start <= end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant <= self.end
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Params {
    pub radius_days: i64,
    pub fields: Vec<Field>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            radius_days: 3,
            fields: Field::ALL.to_vec(),
        }
    }
}

/// Everything the presentation layer needs for one selection event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionReport {
    pub window: TimeWindow,
    pub filtered_series: Vec<EnvironmentalSample>,
    pub highlights: BTreeMap<Field, Option<f64>>,
    pub stats: BTreeMap<Field, Option<StatisticsSummary>>,
}

/// Stable inclusive filter of `samples` to `window`, preserving input order.
/// Input need not be sorted; the scan is a single linear pass.
pub fn filter_window(samples: &[EnvironmentalSample], window: &TimeWindow) -> Vec<EnvironmentalSample> {
    samples
        .iter()
        .filter(|sample| window.contains(sample.time))
        .copied()
        .collect()
}

/// Value of `field` on the first sample whose instant exactly equals
/// `reference`, or `None` when there is no exact match or the field is
/// absent on it. Equality is on the normalized instant, never on source
/// text.
pub fn locate_highlight(
    samples: &[EnvironmentalSample],
    reference: NaiveDateTime,
    field: Field,
) -> Option<f64> {
    samples
        .iter()
        .find(|sample| sample.time == reference)
        .and_then(|sample| field.value_of(sample))
}

/// Run the full selection pipeline for one clicked fix: window around the
/// observation time, stable filter, per-field statistics, per-field exact
/// highlight. Purely functional; every call is independent.
pub fn correlate(
    fix: &PositionFix,
    series: &[EnvironmentalSample],
    params: &Params,
) -> SelectionReport {
    let window = timeline::resolve_window(fix.obs_time, params.radius_days);
    let filtered = filter_window(series, &window);

    let mut highlights = BTreeMap::new();
    let mut stats_by_field = BTreeMap::new();
    for &field in &params.fields {
        let values = stats::field_values(&filtered, field);
        stats_by_field.insert(field, stats::summarize(&values));
        highlights.insert(field, locate_highlight(&filtered, fix.obs_time, field));
    }

    SelectionReport {
        window,
        filtered_series: filtered,
        highlights,
        stats: stats_by_field,
    }
}

#[derive(Debug, Deserialize)]
struct RawPositionRow {
    #[serde(rename = "PositionFixTime")]
    fix_time: String,
    #[serde(rename = "ObservationTime")]
    obs_time: String,
    #[serde(rename = "Latitude")]
    lat: f64,
    #[serde(rename = "Longitude")]
    lon: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPositionRecord {
    lat: f64,
    lon: f64,
    fix_time: String,
    obs_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSeriesRecord {
    time: String,
    #[serde(default)]
    pressure: Option<f64>,
    #[serde(default)]
    sea_surface_temperature: Option<f64>,
    #[serde(default)]
    submergence: Option<f64>,
}

/// Parse position records from bytes using the provided format hint
/// (extension). Rows that fail to decode or carry a malformed timestamp are
/// skipped with a warning rather than failing the whole ingest.
pub fn parse_position_records(input: &[u8], format: &str) -> Result<Vec<PositionFix>, CorrError> {
    let format_lc = format.to_ascii_lowercase();
    if format_lc.ends_with(".csv") || format_lc == "csv" {
        parse_position_csv(input)
    } else if format_lc.ends_with(".json") || format_lc == "json" {
        parse_position_json(input)
    } else {
        Err(CorrError::UnsupportedFormat(format.to_string()))
    }
}

fn parse_position_csv(input: &[u8]) -> Result<Vec<PositionFix>, CorrError> {
    let mut reader = csv::Reader::from_reader(input);
    let mut out = Vec::new();
    for (index, row) in reader.deserialize::<RawPositionRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!("skipping position row {}: {}", index + 1, err);
                continue;
            }
        };
        match build_position(row.lat, row.lon, &row.fix_time, &row.obs_time) {
            Ok(fix) => out.push(fix),
            Err(err) => warn!("skipping position row {}: {}", index + 1, err),
        }
    }
    Ok(out)
}

fn parse_position_json(input: &[u8]) -> Result<Vec<PositionFix>, CorrError> {
    let records: Vec<RawPositionRecord> =
        serde_json::from_slice(input).map_err(|e| CorrError::JsonParse(e.to_string()))?;
    let mut out = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match build_position(record.lat, record.lon, &record.fix_time, &record.obs_time) {
            Ok(fix) => out.push(fix),
            Err(err) => warn!("skipping position record {}: {}", index, err),
        }
    }
    Ok(out)
}

fn build_position(
    lat: f64,
    lon: f64,
    fix_time: &str,
    obs_time: &str,
) -> Result<PositionFix, CorrError> {
    Ok(PositionFix {
        lat,
        lon,
        fix_time: timeline::parse_instant(fix_time)?,
        obs_time: timeline::parse_instant(obs_time)?,
    })
}

/// Parse environmental samples from bytes using the provided format hint.
/// Arrival order is preserved; no re-sorting happens at ingest.
pub fn parse_series_records(
    input: &[u8],
    format: &str,
) -> Result<Vec<EnvironmentalSample>, CorrError> {
    let format_lc = format.to_ascii_lowercase();
    if format_lc.ends_with(".csv") || format_lc == "csv" {
        parse_series_csv(input)
    } else if format_lc.ends_with(".json") || format_lc == "json" {
        parse_series_json(input)
    } else {
        Err(CorrError::UnsupportedFormat(format.to_string()))
    }
}

fn parse_series_csv(input: &[u8]) -> Result<Vec<EnvironmentalSample>, CorrError> {
    let mut reader = csv::Reader::from_reader(input);
    let mut out = Vec::new();
    for (index, row) in reader.deserialize::<RawSeriesRecord>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!("skipping series row {}: {}", index + 1, err);
                continue;
            }
        };
        match build_sample(&row) {
            Ok(sample) => out.push(sample),
            Err(err) => warn!("skipping series row {}: {}", index + 1, err),
        }
    }
    Ok(out)
}

fn parse_series_json(input: &[u8]) -> Result<Vec<EnvironmentalSample>, CorrError> {
    let records: Vec<RawSeriesRecord> =
        serde_json::from_slice(input).map_err(|e| CorrError::JsonParse(e.to_string()))?;
    let mut out = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match build_sample(record) {
            Ok(sample) => out.push(sample),
            Err(err) => warn!("skipping series record {}: {}", index, err),
        }
    }
    Ok(out)
}

fn build_sample(record: &RawSeriesRecord) -> Result<EnvironmentalSample, CorrError> {
    Ok(EnvironmentalSample {
        time: timeline::parse_instant(&record.time)?,
        pressure: record.pressure,
        sea_surface_temperature: record.sea_surface_temperature,
        submergence: record.submergence,
    })
}

//! Benchmark-style series records: one JSON object per line with a start
//! timestamp, a frequency and a target sequence.

use chrono::{Duration, NaiveDateTime};
use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

use crate::data::frame::{SeriesFrame, VALUE_COLUMN};
use crate::data::table::parse_timestamp;
use crate::error::{DataError, ForecastError, Result};

/// Sampling frequency of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Minutely,
    Hourly,
    Daily,
    Weekly,
}

impl Frequency {
    /// Parse pandas-style aliases (`T`, `min`, `H`, `D`, `W`, optionally `1`-prefixed).
    pub fn parse(alias: &str) -> Result<Self> {
        let trimmed = alias.trim();
        let unit = trimmed.strip_prefix('1').unwrap_or(trimmed);
        match unit {
            "T" | "min" => Ok(Frequency::Minutely),
            "H" | "h" => Ok(Frequency::Hourly),
            "D" => Ok(Frequency::Daily),
            "W" => Ok(Frequency::Weekly),
            _ => Err(DataError::UnsupportedFrequency(alias.to_string()).into()),
        }
    }

    pub fn step(&self) -> Duration {
        match self {
            Frequency::Minutely => Duration::minutes(1),
            Frequency::Hourly => Duration::hours(1),
            Frequency::Daily => Duration::days(1),
            Frequency::Weekly => Duration::weeks(1),
        }
    }

    /// Whole periods from `from` to `to`, or `None` when `to` is off the grid.
    pub fn periods_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Option<i64> {
        let elapsed = (to - from).num_seconds();
        let step = self.step().num_seconds();
        (elapsed % step == 0).then_some(elapsed / step)
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Minutely => write!(f, "T"),
            Frequency::Hourly => write!(f, "H"),
            Frequency::Daily => write!(f, "D"),
            Frequency::Weekly => write!(f, "W"),
        }
    }
}

/// One series of a benchmark dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRecord {
    pub item_id: String,
    pub start: NaiveDateTime,
    pub freq: Frequency,
    pub target: Vec<f64>,
}

#[derive(Deserialize)]
struct RawRecord {
    item_id: Option<String>,
    start: String,
    freq: String,
    target: Vec<Option<RawValue>>,
}

/// A target entry: a number, or a string such as `"NaN"` for a gap.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Text(String),
}

/// Missing entries (`null`, `"NaN"`) become NaN and are dropped later.
fn parse_target(raw: Vec<Option<RawValue>>, row: usize) -> Result<Vec<f64>> {
    raw.into_iter()
        .map(|value| match value {
            None => Ok(f64::NAN),
            Some(RawValue::Number(v)) => Ok(v),
            Some(RawValue::Text(text)) => text.trim().parse::<f64>().map_err(|_| {
                ForecastError::from(DataError::MalformedValue {
                    row,
                    column: "target".to_string(),
                    value: text.clone(),
                })
            }),
        })
        .collect()
}

/// Read a JSON-lines record file. Blank lines are skipped.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<SeriesRecord>> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading series records");
    read_records(File::open(path)?)
}

pub fn read_records<R: Read>(reader: R) -> Result<Vec<SeriesRecord>> {
    let mut records = Vec::new();
    for (line_number, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let raw: RawRecord = serde_json::from_str(&line)?;
        let start = parse_timestamp(&raw.start).ok_or_else(|| DataError::MalformedTimestamp {
            row: line_number,
            value: raw.start.clone(),
        })?;

        records.push(SeriesRecord {
            item_id: raw.item_id.unwrap_or_else(|| format!("item_{}", records.len())),
            start,
            freq: Frequency::parse(&raw.freq)?,
            target: parse_target(raw.target, line_number)?,
        });
    }
    Ok(records)
}

/// Align records on a shared time index and melt them into a frame with a
/// single `value` column and one group per record.
///
/// Time index 0 is the earliest start; every record must share one
/// frequency and start on its grid, and item ids must be unique.
/// Non-finite observations are dropped.
pub fn records_to_frame(records: &[SeriesRecord]) -> Result<SeriesFrame> {
    let first = records
        .first()
        .ok_or_else(|| DataError::Empty("record set".to_string()))?;

    let freq = first.freq;
    if let Some(other) = records.iter().find(|r| r.freq != freq) {
        return Err(DataError::MixedFrequencies {
            first: freq.to_string(),
            second: other.freq.to_string(),
        }
        .into());
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = records.iter().find(|r| !seen.insert(r.item_id.as_str())) {
        return Err(DataError::DuplicateItem(duplicate.item_id.clone()).into());
    }

    let origin = records.iter().map(|r| r.start).min().unwrap_or(first.start);

    let mut time_index = Vec::new();
    let mut group_ids = Vec::new();
    let mut values = Vec::new();
    let mut dropped = 0usize;

    for record in records {
        let offset = freq
            .periods_between(origin, record.start)
            .ok_or_else(|| DataError::MisalignedRecord {
                item: record.item_id.clone(),
                start: record.start.to_string(),
                freq: freq.to_string(),
            })? as usize;

        for (k, &value) in record.target.iter().enumerate() {
            if !value.is_finite() {
                dropped += 1;
                continue;
            }
            time_index.push(offset + k);
            group_ids.push(record.item_id.clone());
            values.push(value);
        }
    }

    if dropped > 0 {
        warn!(dropped, "dropped non-finite observations from records");
    }

    SeriesFrame::from_parts(
        vec![VALUE_COLUMN.to_string()],
        time_index,
        group_ids,
        Array1::from(values).insert_axis(Axis(1)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINES: &str = r#"{"item_id": "T1", "start": "1996-03-18 00:00:00", "freq": "D", "target": [1.0, 2.0, 3.0, 4.0]}

{"start": "1996-03-20", "freq": "1D", "target": [10.0, 20.0]}
"#;

    #[test]
    fn test_read_records() {
        let records = read_records(LINES.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].item_id, "T1");
        assert_eq!(records[1].item_id, "item_1");
        assert_eq!(records[1].freq, Frequency::Daily);
    }

    #[test]
    fn test_records_share_time_index() {
        let records = read_records(LINES.as_bytes()).unwrap();
        let frame = records_to_frame(&records).unwrap();

        assert_eq!(frame.len(), 6);
        let groups = frame.groups();
        assert_eq!(groups[0].group_id, "T1");
        let item_times: Vec<usize> = groups[1].rows.iter().map(|&r| frame.time_index()[r]).collect();
        assert_eq!(item_times, vec![2, 3]);
        assert_eq!(frame.unique_time_indices(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_missing_values_are_dropped() {
        let lines = r#"{"item_id": "a", "start": "2020-01-01", "freq": "D", "target": [1.0, null, 3.0, "NaN", 5.0]}"#;
        let records = read_records(lines.as_bytes()).unwrap();
        assert_eq!(records[0].target.len(), 5);
        assert!(records[0].target[1].is_nan() && records[0].target[3].is_nan());

        let frame = records_to_frame(&records).unwrap();
        assert_eq!(frame.time_index(), &[0, 2, 4]);
        assert_eq!(frame.values().column(0).to_vec(), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_non_numeric_target_entry() {
        let lines = r#"{"start": "2020-01-01", "freq": "D", "target": [1.0, "n/a"]}"#;
        assert!(matches!(
            read_records(lines.as_bytes()),
            Err(ForecastError::Data(DataError::MalformedValue { row: 0, .. }))
        ));
    }

    #[test]
    fn test_duplicate_item_ids() {
        let lines = r#"{"item_id": "a", "start": "2020-01-01", "freq": "D", "target": [1.0, 2.0]}
{"item_id": "a", "start": "2020-01-01", "freq": "D", "target": [3.0, 4.0]}"#;
        let records = read_records(lines.as_bytes()).unwrap();
        assert!(matches!(
            records_to_frame(&records),
            Err(ForecastError::Data(DataError::DuplicateItem(ref id))) if id == "a"
        ));
    }

    #[test]
    fn test_frequency_parse() {
        assert_eq!(Frequency::parse("H").unwrap(), Frequency::Hourly);
        assert_eq!(Frequency::parse("min").unwrap(), Frequency::Minutely);
        assert!(matches!(
            Frequency::parse("Q"),
            Err(ForecastError::Data(DataError::UnsupportedFrequency(_)))
        ));
    }

    #[test]
    fn test_misaligned_record() {
        let lines = r#"{"start": "2020-01-01 00:00:00", "freq": "D", "target": [1.0]}
{"start": "2020-01-01 06:00:00", "freq": "D", "target": [1.0]}"#;
        let records = read_records(lines.as_bytes()).unwrap();
        assert!(matches!(
            records_to_frame(&records),
            Err(ForecastError::Data(DataError::MisalignedRecord { .. }))
        ));
    }

    #[test]
    fn test_mixed_frequencies() {
        let lines = r#"{"start": "2020-01-01", "freq": "D", "target": [1.0]}
{"start": "2020-01-01", "freq": "H", "target": [1.0]}"#;
        let records = read_records(lines.as_bytes()).unwrap();
        assert!(matches!(
            records_to_frame(&records),
            Err(ForecastError::Data(DataError::MixedFrequencies { .. }))
        ));
    }
}

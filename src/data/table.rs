use chrono::{DateTime, NaiveDate, NaiveDateTime};
use ndarray::{Array2, ArrayView1, Axis};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{DataError, ForecastError, Result};

/// Wide observation table: one row per timestamp, one column per series.
///
/// Timestamps are strictly increasing; this is checked on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    timestamps: Vec<NaiveDateTime>,
    columns: Vec<String>,
    values: Array2<f64>, // (rows, columns)
}

impl ObservationTable {
    pub fn new(timestamps: Vec<NaiveDateTime>, columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != timestamps.len() || values.ncols() != columns.len() {
            return Err(ForecastError::Shape {
                expected: format!("({}, {})", timestamps.len(), columns.len()),
                got: format!("{:?}", values.shape()),
            });
        }
        if timestamps.is_empty() {
            return Err(DataError::Empty("observation table".to_string()).into());
        }

        for (row, pair) in timestamps.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(DataError::UnorderedTimestamps {
                    row: row + 1,
                    previous: pair[0].to_string(),
                    current: pair[1].to_string(),
                }
                .into());
            }
        }

        Ok(ObservationTable { timestamps, columns, values })
    }

    /// Load a CSV file. The timestamp column defaults to the first column.
    pub fn from_csv_path<P: AsRef<Path>>(path: P, timestamp_column: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading observation table");
        let file = File::open(path)?;
        Self::from_csv_reader(file, timestamp_column)
    }

    pub fn from_csv_reader<R: Read>(reader: R, timestamp_column: Option<&str>) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let ts_position = match timestamp_column {
            Some(name) => headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| DataError::MissingColumn(name.to_string()))?,
            None => 0,
        };
        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != ts_position)
            .map(|(_, h)| h.to_string())
            .collect();

        let mut timestamps = Vec::new();
        let mut flat = Vec::new();

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            for (i, field) in record.iter().enumerate() {
                if i == ts_position {
                    timestamps.push(parse_timestamp(field).ok_or_else(|| DataError::MalformedTimestamp {
                        row,
                        value: field.to_string(),
                    })?);
                } else {
                    let value = field.parse::<f64>().map_err(|_| DataError::MalformedValue {
                        row,
                        column: headers[i].to_string(),
                        value: field.to_string(),
                    })?;
                    flat.push(value);
                }
            }
        }

        let values = Array2::from_shape_vec((timestamps.len(), columns.len()), flat).map_err(|e| {
            ForecastError::Shape {
                expected: format!("({}, {})", timestamps.len(), columns.len()),
                got: e.to_string(),
            }
        })?;
        debug!(rows = timestamps.len(), columns = columns.len(), "parsed CSV");

        Self::new(timestamps, columns, values)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.values.index_axis(Axis(1), index))
    }

    pub(crate) fn into_parts(self) -> (Vec<NaiveDateTime>, Vec<String>, Array2<f64>) {
        (self.timestamps, self.columns, self.values)
    }
}

/// Parse RFC 3339, `%Y-%m-%d %H:%M:%S`, `%Y-%m-%dT%H:%M:%S` or `%Y-%m-%d`.
pub(crate) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "datetime,Incoming Solar,Air Temp\n\
                       2023-01-01,10.5,3.0\n\
                       2023-01-02,11.0,2.5\n\
                       2023-01-03,9.75,4.0\n";

    #[test]
    fn test_load_csv() {
        let table = ObservationTable::from_csv_reader(CSV.as_bytes(), None).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.columns(), &["Incoming Solar".to_string(), "Air Temp".to_string()]);
        assert_eq!(table.column("Air Temp").unwrap().to_vec(), vec![3.0, 2.5, 4.0]);
        assert_eq!(table.timestamps()[2].to_string(), "2023-01-03 00:00:00");
    }

    #[test]
    fn test_named_timestamp_column() {
        let csv = "a,when\n1.0,2023-01-01 12:00:00\n2.0,2023-01-01 13:00:00\n";
        let table = ObservationTable::from_csv_reader(csv.as_bytes(), Some("when")).unwrap();
        assert_eq!(table.columns(), &["a".to_string()]);
        assert_eq!(table.values()[[1, 0]], 2.0);
    }

    #[test]
    fn test_rejects_duplicate_timestamps() {
        let csv = "datetime,x\n2023-01-01,1\n2023-01-01,2\n";
        let err = ObservationTable::from_csv_reader(csv.as_bytes(), None).unwrap_err();
        assert!(matches!(err, ForecastError::Data(DataError::UnorderedTimestamps { row: 1, .. })));
    }

    #[test]
    fn test_rejects_malformed_timestamp() {
        let csv = "datetime,x\nyesterday,1\n";
        let err = ObservationTable::from_csv_reader(csv.as_bytes(), None).unwrap_err();
        assert!(matches!(err, ForecastError::Data(DataError::MalformedTimestamp { row: 0, .. })));
    }

    #[test]
    fn test_rejects_non_numeric_value() {
        let csv = "datetime,x\n2023-01-01,abc\n";
        let err = ObservationTable::from_csv_reader(csv.as_bytes(), None).unwrap_err();
        assert!(matches!(err, ForecastError::Data(DataError::MalformedValue { .. })));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2023-05-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2023-05-01T10:00:00").is_some());
        assert!(parse_timestamp("2023-05-01 10:00").is_some());
        assert!(parse_timestamp("05/01/2023").is_none());
    }
}

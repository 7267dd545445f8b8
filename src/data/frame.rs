use ndarray::{Array1, Array2, Axis};
use std::collections::BTreeMap;

use crate::data::table::ObservationTable;
use crate::error::{DataError, ForecastError, Result};

/// Group id given to every row of a single-series frame.
pub const SINGLE_GROUP: &str = "0";

/// Feature name used by melted (global) frames.
pub const VALUE_COLUMN: &str = "value";

/// Long-format series table: `(time_index, group_id, features...)` per row.
///
/// Rows of one group need not be adjacent; [`SeriesFrame::groups`] collects
/// them ordered by time index.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFrame {
    columns: Vec<String>,
    time_index: Vec<usize>,
    group_ids: Vec<String>,
    values: Array2<f64>, // (rows, columns)
}

/// Rows of one group, sorted by time index.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRows {
    pub group_id: String,
    pub rows: Vec<usize>,
}

impl SeriesFrame {
    pub fn from_parts(
        columns: Vec<String>,
        time_index: Vec<usize>,
        group_ids: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self> {
        if time_index.len() != group_ids.len()
            || values.nrows() != time_index.len()
            || values.ncols() != columns.len()
        {
            return Err(ForecastError::Shape {
                expected: format!("({}, {})", time_index.len(), columns.len()),
                got: format!("{:?} with {} group ids", values.shape(), group_ids.len()),
            });
        }
        Ok(SeriesFrame {
            columns,
            time_index,
            group_ids,
            values,
        })
    }

    /// Multivariate view: one group, time index taken from row order.
    pub fn single_series(table: ObservationTable) -> Self {
        let (_, columns, values) = table.into_parts();
        let rows = values.nrows();
        SeriesFrame {
            columns,
            time_index: (0..rows).collect(),
            group_ids: vec![SINGLE_GROUP.to_string(); rows],
            values,
        }
    }

    /// Global view: every column becomes its own group with a single
    /// `value` feature, all groups sharing the table's time index.
    pub fn melted(table: ObservationTable) -> Self {
        let (_, columns, values) = table.into_parts();
        let rows = values.nrows();
        let total = rows * columns.len();

        let mut time_index = Vec::with_capacity(total);
        let mut group_ids = Vec::with_capacity(total);
        let mut flat = Vec::with_capacity(total);

        for (c, name) in columns.iter().enumerate() {
            for (t, &value) in values.index_axis(Axis(1), c).iter().enumerate() {
                time_index.push(t);
                group_ids.push(name.clone());
                flat.push(value);
            }
        }

        SeriesFrame {
            columns: vec![VALUE_COLUMN.to_string()],
            time_index,
            group_ids,
            values: Array1::from(flat).insert_axis(Axis(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.time_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_index.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn time_index(&self) -> &[usize] {
        &self.time_index
    }

    pub fn group_ids(&self) -> &[String] {
        &self.group_ids
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()).into())
    }

    /// Sorted, de-duplicated time indices present in the frame.
    pub fn unique_time_indices(&self) -> Vec<usize> {
        let mut times = self.time_index.clone();
        times.sort_unstable();
        times.dedup();
        times
    }

    /// Rows whose time index appears in `times` (which must be sorted).
    pub fn filter_time(&self, times: &[usize]) -> SeriesFrame {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&row| times.binary_search(&self.time_index[row]).is_ok())
            .collect();

        SeriesFrame {
            columns: self.columns.clone(),
            time_index: keep.iter().map(|&row| self.time_index[row]).collect(),
            group_ids: keep.iter().map(|&row| self.group_ids[row].clone()).collect(),
            values: self.values.select(Axis(0), &keep),
        }
    }

    /// Rows per group, groups in lexical order, rows in time order.
    pub fn groups(&self) -> Vec<GroupRows> {
        let mut by_group: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (row, group) in self.group_ids.iter().enumerate() {
            by_group.entry(group.as_str()).or_default().push(row);
        }

        by_group
            .into_iter()
            .map(|(group_id, mut rows)| {
                rows.sort_by_key(|&row| self.time_index[row]);
                GroupRows {
                    group_id: group_id.to_string(),
                    rows,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::arr2;

    fn table() -> ObservationTable {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let timestamps = (0..3).map(|d| start + chrono::Duration::days(d)).collect();
        ObservationTable::new(
            timestamps,
            vec!["a".to_string(), "b".to_string()],
            arr2(&[[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]),
        )
        .unwrap()
    }

    #[test]
    fn test_single_series_assigns_time_index() {
        let frame = SeriesFrame::single_series(table());
        assert_eq!(frame.time_index(), &[0, 1, 2]);
        assert!(frame.group_ids().iter().all(|g| g == SINGLE_GROUP));
        assert_eq!(frame.columns().len(), 2);
    }

    #[test]
    fn test_melted_creates_group_per_column() {
        let frame = SeriesFrame::melted(table());
        assert_eq!(frame.len(), 6);
        assert_eq!(frame.columns(), &[VALUE_COLUMN.to_string()]);

        let groups = frame.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].group_id, "b");
        let b_values: Vec<f64> = groups[1].rows.iter().map(|&r| frame.values()[[r, 0]]).collect();
        assert_eq!(b_values, vec![10.0, 20.0, 30.0]);
        assert_eq!(frame.unique_time_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn test_filter_time() {
        let frame = SeriesFrame::melted(table());
        let filtered = frame.filter_time(&[1, 2]);
        assert_eq!(filtered.len(), 4);
        assert!(filtered.time_index().iter().all(|&t| t >= 1));
        assert_eq!(filtered.values()[[0, 0]], 2.0);
    }

    #[test]
    fn test_missing_column() {
        let frame = SeriesFrame::single_series(table());
        assert!(matches!(
            frame.column_index("c"),
            Err(ForecastError::Data(DataError::MissingColumn(_)))
        ));
    }
}

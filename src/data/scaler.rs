use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::data::frame::SeriesFrame;
use crate::error::{DataError, Result};

/// Min-max scaler mapping the fitted range onto [0, 1].
///
/// A constant column maps every value to 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    pub fn fit(values: ArrayView1<'_, f64>) -> Self {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        MinMaxScaler { min, max }
    }

    fn range(&self) -> f64 {
        let range = self.max - self.min;
        if range > 0.0 {
            range
        } else {
            1.0
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn inverse_transform(&self, value: f64) -> f64 {
        value * self.range() + self.min
    }
}

/// Per-column scalers fitted on one partition and reused on the others.
///
/// Columns without a scaler pass through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScalers {
    columns: Vec<String>,
    scalers: Vec<Option<MinMaxScaler>>,
}

impl FeatureScalers {
    /// Fit a scaler for each of `scaled` on the rows of `frame`.
    pub fn fit(frame: &SeriesFrame, scaled: &[String]) -> Result<Self> {
        if frame.is_empty() {
            return Err(DataError::Empty("training partition".to_string()).into());
        }

        let mut scalers = vec![None; frame.columns().len()];
        for name in scaled {
            let index = frame.column_index(name)?;
            scalers[index] = Some(MinMaxScaler::fit(frame.values().index_axis(Axis(1), index)));
        }

        Ok(FeatureScalers {
            columns: frame.columns().to_vec(),
            scalers,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&MinMaxScaler> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.scalers[index].as_ref()
    }

    pub fn is_scaled(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Scale `(rows, columns)` values laid out like the fitted frame.
    pub fn transform(&self, values: &Array2<f64>) -> Array2<f64> {
        let mut out = values.clone();
        for (mut column, scaler) in out.axis_iter_mut(Axis(1)).zip(&self.scalers) {
            if let Some(scaler) = scaler {
                column.mapv_inplace(|v| scaler.transform(v));
            }
        }
        out
    }
}

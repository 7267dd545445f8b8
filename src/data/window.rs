use ndarray::{s, Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::frame::SeriesFrame;
use crate::data::scaler::FeatureScalers;
use crate::error::{DataError, ForecastError, Result};

/// Encoder / decoder lengths and the predicted column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub n_lags: usize,
    pub horizon: usize,
    pub target: String,
}

impl WindowSpec {
    pub fn new(n_lags: usize, horizon: usize, target: impl Into<String>) -> Self {
        WindowSpec {
            n_lags,
            horizon,
            target: target.into(),
        }
    }

    /// Observations spanned by one encoder + decoder window.
    pub fn span(&self) -> usize {
        self.n_lags + self.horizon
    }
}

/// Number of full windows in a contiguous run of `len` observations.
pub fn window_count(len: usize, n_lags: usize, horizon: usize) -> usize {
    (len + 1).saturating_sub(n_lags + horizon)
}

/// One encoder window and, outside the trailing predict window, its target.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSample {
    pub group_id: String,
    /// Time index of the first encoder step.
    pub anchor: usize,
    /// `(n_lags, features)`
    pub encoder: Array2<f64>,
    /// `(horizon,)`, `None` for the trailing predict window.
    pub target: Option<Array1<f64>>,
}

/// Where a batch row came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub group_id: String,
    pub anchor: usize,
    pub has_target: bool,
}

/// A batch of windows ready for the model.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `(batch, n_lags, features)`
    pub encoder: Array3<f64>,
    /// `(batch, horizon)`, present only when every window has a target.
    pub target: Option<Array2<f64>>,
    pub windows: Vec<WindowInfo>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[derive(Debug, Clone)]
struct GroupSeries {
    group_id: String,
    time_index: Vec<usize>,
    features: Array2<f64>, // scaled, (rows, features)
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    group: usize,
    offset: usize,
    has_target: bool,
}

/// Sliding windows over every group of a frame.
///
/// Scaled group values are stored once; samples and batches are sliced out
/// of them on request.
#[derive(Debug, Clone)]
pub struct WindowedDataset {
    spec: WindowSpec,
    scalers: FeatureScalers,
    target_position: usize,
    groups: Vec<GroupSeries>,
    anchors: Vec<Anchor>,
}

impl WindowedDataset {
    /// Build the training dataset, fitting scalers for `scaled_columns` on
    /// this frame only.
    pub fn training(frame: &SeriesFrame, spec: WindowSpec, scaled_columns: &[String]) -> Result<Self> {
        frame.column_index(&spec.target)?;
        let scalers = FeatureScalers::fit(frame, scaled_columns)?;
        Self::build(frame, spec, scalers, false)
    }

    /// Build a dataset over another partition with the template's window
    /// spec and already fitted scalers. With `predict` set, each group also
    /// gets a trailing window ending at its last observation.
    pub fn from_dataset(template: &WindowedDataset, frame: &SeriesFrame, predict: bool) -> Result<Self> {
        if frame.columns() != template.scalers.columns() {
            return Err(ForecastError::Shape {
                expected: format!("columns {:?}", template.scalers.columns()),
                got: format!("columns {:?}", frame.columns()),
            });
        }
        Self::build(frame, template.spec.clone(), template.scalers.clone(), predict)
    }

    /// Build a dataset from a spec and scalers fitted elsewhere, such as the
    /// ones stored with a saved model.
    pub fn with_scalers(frame: &SeriesFrame, spec: WindowSpec, scalers: FeatureScalers, predict: bool) -> Result<Self> {
        if frame.columns() != scalers.columns() {
            return Err(ForecastError::Shape {
                expected: format!("columns {:?}", scalers.columns()),
                got: format!("columns {:?}", frame.columns()),
            });
        }
        Self::build(frame, spec, scalers, predict)
    }

    fn build(frame: &SeriesFrame, spec: WindowSpec, scalers: FeatureScalers, predict: bool) -> Result<Self> {
        let target_position = frame.column_index(&spec.target)?;
        if frame.is_empty() {
            return Err(DataError::Empty("partition".to_string()).into());
        }

        let required = if predict { spec.n_lags } else { spec.span() };
        let mut groups = Vec::new();
        let mut anchors = Vec::new();

        for rows in frame.groups() {
            let time_index: Vec<usize> = rows.rows.iter().map(|&r| frame.time_index()[r]).collect();
            let features = scalers.transform(&frame.values().select(Axis(0), &rows.rows));
            let group = groups.len();

            let runs = contiguous_runs(&time_index);
            let longest = runs.iter().map(|(start, end)| end - start).max().unwrap_or(0);
            if longest < required {
                return Err(DataError::SeriesTooShort {
                    group: rows.group_id,
                    required,
                    available: longest,
                }
                .into());
            }

            for &(start, end) in &runs {
                let count = window_count(end - start, spec.n_lags, spec.horizon);
                anchors.extend((start..start + count).map(|offset| Anchor {
                    group,
                    offset,
                    has_target: true,
                }));
            }

            if predict {
                // The trailing window must end at the group's last observation.
                let (start, end) = runs.last().copied().unwrap_or((0, 0));
                if end - start < spec.n_lags {
                    return Err(DataError::SeriesTooShort {
                        group: rows.group_id,
                        required: spec.n_lags,
                        available: end - start,
                    }
                    .into());
                }
                anchors.push(Anchor {
                    group,
                    offset: end - spec.n_lags,
                    has_target: false,
                });
            }

            groups.push(GroupSeries {
                group_id: rows.group_id,
                time_index,
                features,
            });
        }

        debug!(
            groups = groups.len(),
            windows = anchors.len(),
            predict,
            "built windowed dataset"
        );

        Ok(WindowedDataset {
            spec,
            scalers,
            target_position,
            groups,
            anchors,
        })
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    pub fn scalers(&self) -> &FeatureScalers {
        &self.scalers
    }

    pub fn num_features(&self) -> usize {
        self.scalers.columns().len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Map a model output for the target back to the original units.
    pub fn inverse_target(&self, value: f64) -> f64 {
        match self.scalers.get(&self.spec.target) {
            Some(scaler) => scaler.inverse_transform(value),
            None => value,
        }
    }

    pub fn sample(&self, index: usize) -> Option<WindowSample> {
        let anchor = self.anchors.get(index)?;
        let group = &self.groups[anchor.group];
        let encoder_end = anchor.offset + self.spec.n_lags;

        let target = anchor.has_target.then(|| {
            group
                .features
                .slice(s![encoder_end..encoder_end + self.spec.horizon, self.target_position])
                .to_owned()
        });

        Some(WindowSample {
            group_id: group.group_id.clone(),
            anchor: group.time_index[anchor.offset],
            encoder: group.features.slice(s![anchor.offset..encoder_end, ..]).to_owned(),
            target,
        })
    }

    pub fn samples(&self) -> impl Iterator<Item = WindowSample> + '_ {
        (0..self.len()).filter_map(move |i| self.sample(i))
    }

    /// In-order batches of at most `batch_size` windows. Calling this again
    /// restarts from the first window.
    pub fn batches(&self, batch_size: usize) -> Batches<'_> {
        Batches {
            dataset: self,
            batch_size: batch_size.max(1),
            next: 0,
        }
    }

    pub fn num_batches(&self, batch_size: usize) -> usize {
        let batch_size = batch_size.max(1);
        (self.len() + batch_size - 1) / batch_size
    }

    fn batch(&self, range: std::ops::Range<usize>) -> Batch {
        let (n_lags, horizon) = (self.spec.n_lags, self.spec.horizon);
        let anchors = &self.anchors[range];
        let with_target = anchors.iter().all(|a| a.has_target);

        let mut encoder = Array3::zeros((anchors.len(), n_lags, self.num_features()));
        let mut target = with_target.then(|| Array2::zeros((anchors.len(), horizon)));
        let mut windows = Vec::with_capacity(anchors.len());

        for (i, anchor) in anchors.iter().enumerate() {
            let group = &self.groups[anchor.group];
            let encoder_end = anchor.offset + n_lags;

            encoder
                .slice_mut(s![i, .., ..])
                .assign(&group.features.slice(s![anchor.offset..encoder_end, ..]));
            if let Some(target) = target.as_mut() {
                target.slice_mut(s![i, ..]).assign(
                    &group
                        .features
                        .slice(s![encoder_end..encoder_end + horizon, self.target_position]),
                );
            }
            windows.push(WindowInfo {
                group_id: group.group_id.clone(),
                anchor: group.time_index[anchor.offset],
                has_target: anchor.has_target,
            });
        }

        Batch { encoder, target, windows }
    }
}

/// Iterator over the batches of a [`WindowedDataset`].
pub struct Batches<'a> {
    dataset: &'a WindowedDataset,
    batch_size: usize,
    next: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.next >= self.dataset.len() {
            return None;
        }
        let end = (self.next + self.batch_size).min(self.dataset.len());
        let batch = self.dataset.batch(self.next..end);
        self.next = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dataset.len().saturating_sub(self.next);
        let batches = (remaining + self.batch_size - 1) / self.batch_size;
        (batches, Some(batches))
    }
}

impl<'a> ExactSizeIterator for Batches<'a> {}

/// Half-open offset ranges over which time indices increase by exactly one.
fn contiguous_runs(time_index: &[usize]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=time_index.len() {
        if i == time_index.len() || time_index[i] != time_index[i - 1] + 1 {
            if i > start {
                runs.push((start, i));
            }
            start = i;
        }
    }
    runs
}

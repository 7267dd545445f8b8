use tracing::info;

use crate::config::ForecastConfig;
use crate::data::frame::SeriesFrame;
use crate::data::split::{split_time_indices, SplitIndices};
use crate::data::window::{Batches, WindowSpec, WindowedDataset};
use crate::error::Result;

/// Supplies finite, restartable batch sequences for each stage of a run.
pub trait DatasetProvider {
    fn train_batches(&self) -> Batches<'_>;
    fn validation_batches(&self) -> Batches<'_>;
    fn test_batches(&self) -> Batches<'_>;
    fn predict_batches(&self) -> Batches<'_>;

    /// Dataset backing the predict batches, used to map outputs back to the
    /// target's original units.
    fn predict_dataset(&self) -> &WindowedDataset;
}

/// Owns a series frame and the four windowed datasets derived from it.
///
/// Split indices come from the frame's unique time indices; scalers are
/// fitted on the training partition and shared by the other three.
#[derive(Debug, Clone)]
pub struct SeriesDataModule {
    frame: SeriesFrame,
    split: SplitIndices,
    batch_size: usize,
    training: WindowedDataset,
    validation: WindowedDataset,
    test: WindowedDataset,
    predict: WindowedDataset,
}

/// Batch size used for prediction.
pub const PREDICT_BATCH_SIZE: usize = 1;

impl SeriesDataModule {
    pub fn setup(frame: SeriesFrame, config: &ForecastConfig) -> Result<Self> {
        config.validate()?;
        frame.column_index(&config.target)?;

        let split = split_time_indices(&frame.unique_time_indices(), config.test_size, config.validation_size)?;
        info!(
            train = split.train.len(),
            validation = split.validation.len(),
            test = split.test.len(),
            "split time indices"
        );

        let spec = WindowSpec::new(config.n_lags, config.horizon, config.target.clone());
        let scaled = scaled_columns(&frame, config);

        let training = WindowedDataset::training(&frame.filter_time(&split.train), spec, &scaled)?;
        let validation = WindowedDataset::from_dataset(&training, &frame.filter_time(&split.validation), false)?;
        let test = WindowedDataset::from_dataset(&training, &frame.filter_time(&split.test), false)?;
        let predict = WindowedDataset::from_dataset(&training, &frame, true)?;

        info!(
            train = training.len(),
            validation = validation.len(),
            test = test.len(),
            predict = predict.len(),
            "built windowed datasets"
        );

        Ok(SeriesDataModule {
            frame,
            split,
            batch_size: config.batch_size,
            training,
            validation,
            test,
            predict,
        })
    }

    pub fn frame(&self) -> &SeriesFrame {
        &self.frame
    }

    pub fn split(&self) -> &SplitIndices {
        &self.split
    }

    pub fn training(&self) -> &WindowedDataset {
        &self.training
    }

    pub fn validation(&self) -> &WindowedDataset {
        &self.validation
    }

    pub fn test(&self) -> &WindowedDataset {
        &self.test
    }

    pub fn predict(&self) -> &WindowedDataset {
        &self.predict
    }

    pub fn num_features(&self) -> usize {
        self.training.num_features()
    }
}

impl DatasetProvider for SeriesDataModule {
    fn train_batches(&self) -> Batches<'_> {
        self.training.batches(self.batch_size)
    }

    fn validation_batches(&self) -> Batches<'_> {
        self.validation.batches(self.batch_size)
    }

    fn test_batches(&self) -> Batches<'_> {
        self.test.batches(self.batch_size)
    }

    fn predict_batches(&self) -> Batches<'_> {
        self.predict.batches(PREDICT_BATCH_SIZE)
    }

    fn predict_dataset(&self) -> &WindowedDataset {
        &self.predict
    }
}

/// Explicit list from the config, or every non-target feature; the target is
/// added when `scale_target` is set.
fn scaled_columns(frame: &SeriesFrame, config: &ForecastConfig) -> Vec<String> {
    let mut columns: Vec<String> = match &config.scaled_columns {
        Some(columns) => columns.iter().filter(|c| **c != config.target).cloned().collect(),
        None => frame
            .columns()
            .iter()
            .filter(|c| **c != config.target)
            .cloned()
            .collect(),
    };
    if config.scale_target {
        columns.push(config.target.clone());
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::SINGLE_GROUP;
    use crate::error::{DataError, ForecastError};
    use ndarray::Array2;

    fn frame(len: usize) -> SeriesFrame {
        let values = Array2::from_shape_fn((len, 3), |(t, c)| (t * (c + 1)) as f64);
        SeriesFrame::from_parts(
            vec!["Incoming Solar".to_string(), "Air Temp".to_string(), "Wind".to_string()],
            (0..len).collect(),
            vec![SINGLE_GROUP.to_string(); len],
            values,
        )
        .unwrap()
    }

    fn config() -> ForecastConfig {
        ForecastConfig {
            n_lags: 7,
            horizon: 1,
            test_size: 0.3,
            batch_size: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_setup_partitions() {
        let module = SeriesDataModule::setup(frame(200), &config()).unwrap();
        let split = module.split();
        assert_eq!(split.test.len(), 60);
        assert_eq!(split.validation.len(), 14);
        assert_eq!(split.train.len(), 126);

        assert_eq!(module.training().len(), 126 - 7);
        assert_eq!(module.validation().len(), 14 - 7);
        assert_eq!(module.test().len(), 60 - 7);
        assert_eq!(module.predict().len(), 200 - 7 + 1);
        assert_eq!(module.num_features(), 3);
    }

    #[test]
    fn test_default_scaling_skips_target() {
        let module = SeriesDataModule::setup(frame(200), &config()).unwrap();
        let scalers = module.training().scalers();
        assert!(!scalers.is_scaled("Incoming Solar"));
        assert!(scalers.is_scaled("Air Temp"));
        assert!(scalers.is_scaled("Wind"));

        // Fitted on training rows only: Air Temp = 2t for t < 126.
        assert_eq!(scalers.get("Air Temp").unwrap().max, 250.0);
    }

    #[test]
    fn test_scale_target() {
        let config = ForecastConfig {
            scale_target: true,
            scaled_columns: Some(vec!["Wind".to_string()]),
            ..config()
        };
        let module = SeriesDataModule::setup(frame(200), &config).unwrap();
        let scalers = module.training().scalers();
        assert!(scalers.is_scaled("Incoming Solar"));
        assert!(!scalers.is_scaled("Air Temp"));
        assert_eq!(module.predict().inverse_target(1.0), 125.0);
    }

    #[test]
    fn test_batches_are_restartable() {
        let module = SeriesDataModule::setup(frame(200), &config()).unwrap();
        let first: Vec<usize> = module.train_batches().map(|b| b.len()).collect();
        let second: Vec<usize> = module.train_batches().map(|b| b.len()).collect();
        assert_eq!(first, second);
        assert_eq!(first.iter().sum::<usize>(), 119);
        assert!(module.predict_batches().all(|b| b.len() == PREDICT_BATCH_SIZE));
    }

    #[test]
    fn test_missing_target_fails_before_split() {
        let config = ForecastConfig {
            target: "Pressure".to_string(),
            ..config()
        };
        let err = SeriesDataModule::setup(frame(200), &config).unwrap_err();
        assert!(matches!(err, ForecastError::Data(DataError::MissingColumn(_))));
    }

    #[test]
    fn test_short_validation_partition_fails() {
        // 100 rows leave 7 validation rows, fewer than n_lags + horizon.
        let err = SeriesDataModule::setup(frame(100), &config()).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::Data(DataError::SeriesTooShort {
                required: 8,
                available: 7,
                ..
            })
        ));
    }
}

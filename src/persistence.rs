use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

use crate::config::ForecastConfig;
use crate::data::frame::SeriesFrame;
use crate::data::scaler::FeatureScalers;
use crate::data::window::{WindowSpec, WindowedDataset};
use crate::data::module::PREDICT_BATCH_SIZE;
use crate::error::{ForecastError, Result};
use crate::models::forecaster::LSTMForecaster;
use crate::training::{forecast_batches, GroupForecast, TrainingReport};

/// Model metadata for tracking training information
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub total_epochs: usize,
    pub best_epoch: Option<usize>,
    pub final_loss: Option<f64>,
    pub description: Option<String>,
}

/// A trained forecaster together with everything needed to feed it new data.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SavedForecaster {
    pub model: LSTMForecaster,
    pub spec: WindowSpec,
    /// Scalers fitted on the training partition.
    pub scalers: FeatureScalers,
    pub config: ForecastConfig,
    pub metadata: ModelMetadata,
}

/// On-disk encoding, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Json,
    Binary,
}

impl ModelFormat {
    /// `.json` is JSON; anything else (`.bin`, `.model`, none) is bincode.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => ModelFormat::Json,
            _ => ModelFormat::Binary,
        }
    }
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save model to JSON format (human-readable)
    pub fn save_to_json<P: AsRef<Path>>(model: &SavedForecaster, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, model)?;
        writer.flush()?;
        Ok(())
    }

    /// Load model from JSON format
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<SavedForecaster> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Save model to binary format (compact and fast)
    pub fn save_to_binary<P: AsRef<Path>>(model: &SavedForecaster, path: P) -> Result<()> {
        let encoded = bincode::serialize(model)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load model from binary format
    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<SavedForecaster> {
        let mut file = File::open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        Ok(bincode::deserialize(&contents)?)
    }

    /// Bundle a trained model with the scalers and settings of its run.
    pub fn create_saved_forecaster(
        model: &LSTMForecaster,
        training: &WindowedDataset,
        config: &ForecastConfig,
        report: Option<&TrainingReport>,
        model_name: String,
        description: Option<String>,
    ) -> SavedForecaster {
        let metadata = ModelMetadata {
            model_name,
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            input_size: model.network.input_size,
            hidden_size: model.network.hidden_size,
            num_layers: model.network.num_layers,
            total_epochs: report.map(|r| r.epochs_run()).unwrap_or(0),
            best_epoch: report.and_then(|r| r.best_epoch),
            final_loss: report.and_then(|r| r.best_loss.or_else(|| r.final_train_loss())),
            description,
        };

        SavedForecaster {
            model: model.clone(),
            spec: training.spec().clone(),
            scalers: training.scalers().clone(),
            config: config.clone(),
            metadata,
        }
    }
}

impl SavedForecaster {
    /// Save to file (format determined by file extension)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        match ModelFormat::from_path(path) {
            ModelFormat::Json => ModelPersistence::save_to_json(self, path)?,
            ModelFormat::Binary => ModelPersistence::save_to_binary(self, path)?,
        }
        info!(path = %path.display(), "saved model");
        Ok(())
    }

    /// Load from file (format determined by file extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let saved = match ModelFormat::from_path(path) {
            ModelFormat::Json => ModelPersistence::load_from_json(path)?,
            ModelFormat::Binary => ModelPersistence::load_from_binary(path)?,
        };

        if saved.model.input_size() != saved.scalers.columns().len() {
            return Err(ForecastError::Shape {
                expected: format!("{} input features", saved.model.input_size()),
                got: format!("{} scaler columns", saved.scalers.columns().len()),
            });
        }
        info!(path = %path.display(), model = %saved.metadata.model_name, "loaded model");
        Ok(saved)
    }

    /// Forecast every predict-mode window of `frame`, scaled with the stored
    /// training scalers.
    pub fn forecast(&self, frame: &SeriesFrame) -> Result<Vec<GroupForecast>> {
        let dataset = WindowedDataset::with_scalers(frame, self.spec.clone(), self.scalers.clone(), true)?;
        forecast_batches(&self.model, &dataset, dataset.batches(PREDICT_BATCH_SIZE))
    }
}

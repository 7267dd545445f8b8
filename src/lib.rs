//! # lstm-forecast
//!
//! Multivariate and global time-series forecasting with LSTM networks, built
//! on `ndarray` with explicit backpropagation through time.
//!
//! ## Core Components
//!
//! - **Data**: CSV and JSON-lines loaders, ordered train / validation / test
//!   splits, sliding encoder windows with min-max scaling fitted on training
//!   data only
//! - **Model**: multi-layer LSTM followed by a linear head producing a
//!   `horizon`-step point forecast
//! - **Training**: MSE loss, SGD or Adam, gradient clipping, per-epoch
//!   validation and early stopping
//! - **Persistence**: trained models saved with their scalers as JSON or bincode
//!
//! ## Quick Start
//!
//! ```no_run
//! use lstm_forecast::{create_adam_trainer, ForecastConfig, LSTMForecaster, ObservationTable, SeriesDataModule, SeriesFrame};
//!
//! # fn main() -> lstm_forecast::Result<()> {
//! let config = ForecastConfig::default();
//! let table = ObservationTable::from_csv_path("weather.csv", Some("Date"))?;
//! let data = SeriesDataModule::setup(SeriesFrame::single_series(table), &config)?;
//!
//! let model = LSTMForecaster::from_config(&config, data.num_features());
//! let mut trainer = create_adam_trainer(model, config.learning_rate).with_config(config.training_config());
//! trainer.fit(&data)?;
//! let metrics = trainer.test(&data)?;
//! let forecasts = trainer.predict(&data)?;
//! # let _ = (metrics, forecasts);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod early_stopping;
pub mod error;
pub mod layers;
pub mod loss;
pub mod models;
pub mod optimizers;
pub mod persistence;
pub mod training;

// Re-export commonly used items
pub use config::ForecastConfig;
pub use data::{
    split_time_indices, DatasetProvider, ObservationTable, SeriesDataModule, SeriesFrame, SplitIndices, WindowSpec,
    WindowedDataset,
};
pub use early_stopping::{EarlyStopper, EarlyStoppingConfig, EarlyStoppingMetric};
pub use error::{ConfigError, DataError, ForecastError, Result, Stage};
pub use layers::lstm_cell::LSTMCell;
pub use loss::{LossFunction, MAELoss, MSELoss};
pub use models::lstm_network::LSTMNetwork;
pub use models::{LSTMForecaster, TrainableModel};
pub use optimizers::{Adam, Optimizer, SGD};
pub use persistence::{ModelMetadata, ModelPersistence, SavedForecaster};
pub use training::{
    create_adam_trainer, create_basic_trainer, GroupForecast, StopReason, TestMetrics, Trainer, TrainingConfig,
    TrainingMetrics, TrainingReport, TrainingState,
};

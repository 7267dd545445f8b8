use ndarray::Array2;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::data::module::DatasetProvider;
use crate::data::window::{Batch, Batches, WindowedDataset};
use crate::early_stopping::{EarlyStopper, EarlyStoppingConfig, EarlyStoppingMetric};
use crate::error::{ConfigError, DataError, ForecastError, Result, Stage};
use crate::loss::{LossFunction, MAELoss, MSELoss};
use crate::models::forecaster::{clip_by_global_norm, LSTMForecaster, TrainableModel};
use crate::optimizers::{Adam, Optimizer, SGD};

/// Configuration for training hyperparameters
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub max_epochs: usize,
    /// Emit an info event every `log_every` epochs.
    pub log_every: usize,
    /// Maximum global gradient norm per batch.
    pub clip_gradient: Option<f64>,
    pub early_stopping: Option<EarlyStoppingConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            max_epochs: 100,
            log_every: 1,
            clip_gradient: None,
            early_stopping: Some(EarlyStoppingConfig::default()),
        }
    }
}

/// Training metrics tracked during training
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
    pub time_elapsed: f64,
    pub learning_rate: f64,
}

/// Lifecycle of a [`Trainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Idle,
    Running,
    EarlyStopped,
    MaxEpochsReached,
    Finished,
}

/// Why a fit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EarlyStopped { epoch: usize },
    MaxEpochsReached,
}

/// Outcome of [`Trainer::fit`].
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub history: Vec<TrainingMetrics>,
    pub stop_reason: StopReason,
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    /// Whether the model was rolled back to the best epoch.
    pub restored_best_weights: bool,
}

impl TrainingReport {
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }

    pub fn final_train_loss(&self) -> Option<f64> {
        self.history.last().map(|m| m.train_loss)
    }
}

/// Aggregated test-set error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestMetrics {
    /// Mean of the per-batch mean squared errors.
    pub mse: f64,
    /// Mean of the per-batch mean absolute errors.
    pub mae: f64,
    pub batches: usize,
    pub samples: usize,
}

/// Forecast for one predict window, in the target's original units.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupForecast {
    pub group_id: String,
    /// Time index of the first encoder step.
    pub anchor: usize,
    /// Time index of the first forecast step.
    pub first_step: usize,
    pub values: Vec<f64>,
    /// False for the trailing window that forecasts beyond the data.
    pub has_target: bool,
}

/// Drives a [`TrainableModel`] through fit, test and predict.
pub struct Trainer<M: TrainableModel, L: LossFunction, O: Optimizer> {
    pub model: M,
    pub loss_function: L,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub metrics_history: Vec<TrainingMetrics>,
    state: TrainingState,
}

impl<M: TrainableModel, L: LossFunction, O: Optimizer> Trainer<M, L, O> {
    pub fn new(model: M, loss_function: L, optimizer: O) -> Self {
        Trainer {
            model,
            loss_function,
            optimizer,
            config: TrainingConfig::default(),
            metrics_history: Vec::new(),
            state: TrainingState::Idle,
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    /// Train on the provider's training batches, validating after every epoch.
    ///
    /// Each training batch yields one (optionally clipped) parameter update.
    /// A non-finite loss aborts the run before that batch updates anything.
    pub fn fit<P: DatasetProvider + ?Sized>(&mut self, data: &P) -> Result<TrainingReport> {
        if data.train_batches().len() == 0 {
            return Err(DataError::Empty("training windows".to_string()).into());
        }
        let has_validation = data.validation_batches().len() > 0;
        if let Some(early_stopping) = &self.config.early_stopping {
            if early_stopping.monitor == EarlyStoppingMetric::ValidationLoss && !has_validation {
                return Err(ConfigError::MissingValidation.into());
            }
        }

        let mut stopper = self.config.early_stopping.clone().map(EarlyStopper::new);
        self.metrics_history.clear();
        self.state = TrainingState::Running;

        info!(max_epochs = self.config.max_epochs, "starting training");

        let outcome = self.run_epochs(data, &mut stopper);
        let stop_reason = match outcome {
            Ok(reason) => reason,
            Err(err) => {
                self.state = TrainingState::Idle;
                return Err(err);
            }
        };

        self.state = match stop_reason {
            StopReason::EarlyStopped { .. } => TrainingState::EarlyStopped,
            StopReason::MaxEpochsReached => TrainingState::MaxEpochsReached,
        };

        let (best_epoch, best_loss, best_weights) = match stopper.as_mut() {
            Some(stopper) => (
                stopper.best_epoch(),
                stopper.best_epoch().map(|_| stopper.best_score()),
                stopper.take_best_weights(),
            ),
            None => (None, None, None),
        };

        let restored_best_weights = match best_weights {
            Some(best) => {
                info!(epoch = ?best_epoch, "restoring best weights");
                self.model = best;
                true
            }
            None => false,
        };

        info!(
            epochs = self.metrics_history.len(),
            reason = ?stop_reason,
            best_epoch = ?best_epoch,
            "training completed"
        );
        self.state = TrainingState::Finished;

        Ok(TrainingReport {
            history: self.metrics_history.clone(),
            stop_reason,
            best_epoch,
            best_loss,
            restored_best_weights,
        })
    }

    fn run_epochs<P: DatasetProvider + ?Sized>(
        &mut self,
        data: &P,
        stopper: &mut Option<EarlyStopper<M>>,
    ) -> Result<StopReason> {
        let has_validation = data.validation_batches().len() > 0;

        for epoch in 0..self.config.max_epochs {
            let start_time = Instant::now();

            let train_loss = self.train_epoch(data.train_batches(), epoch)?;
            let validation_loss = if has_validation {
                Some(self.evaluate(data.validation_batches(), Stage::Validation, epoch)?)
            } else {
                None
            };

            let metrics = TrainingMetrics {
                epoch,
                train_loss,
                validation_loss,
                time_elapsed: start_time.elapsed().as_secs_f64(),
                learning_rate: self.optimizer.learning_rate(),
            };
            self.metrics_history.push(metrics.clone());

            if self.config.log_every > 0 && epoch % self.config.log_every == 0 {
                info!(
                    epoch,
                    train_loss,
                    validation_loss = ?validation_loss,
                    elapsed = metrics.time_elapsed,
                    "epoch finished"
                );
            }

            if let Some(stopper) = stopper.as_mut() {
                let (should_stop, is_best) = stopper.should_stop(&metrics, &self.model);
                if is_best {
                    debug!(epoch, best = stopper.best_score(), "new best epoch");
                }
                if should_stop {
                    info!(epoch, patience = stopper.config().patience, "early stopping");
                    return Ok(StopReason::EarlyStopped { epoch });
                }
            }
        }

        Ok(StopReason::MaxEpochsReached)
    }

    fn train_epoch(&mut self, batches: Batches<'_>, epoch: usize) -> Result<f64> {
        let mut total_loss = 0.0;
        let mut count = 0;

        for (index, batch) in batches.enumerate() {
            let target = batch_target(&batch, Stage::Train)?;
            let (loss, mut gradients) = self.model.backward(&batch.encoder, target, &self.loss_function)?;
            if !loss.is_finite() {
                return Err(ForecastError::NonFiniteLoss {
                    stage: Stage::Train,
                    epoch,
                    batch: index,
                });
            }

            if let Some(max_norm) = self.config.clip_gradient {
                let norm = clip_by_global_norm(&mut gradients, max_norm);
                if norm > max_norm {
                    debug!(epoch, batch = index, norm, "clipped gradients");
                }
            }

            self.model.update(&gradients, &mut self.optimizer);
            debug!(epoch, batch = index, loss, "train batch");

            total_loss += loss;
            count += 1;
        }

        Ok(total_loss / count.max(1) as f64)
    }

    /// Mean batch loss over `batches` without updating the model.
    pub fn evaluate(&self, batches: Batches<'_>, stage: Stage, epoch: usize) -> Result<f64> {
        let mut total_loss = 0.0;
        let mut count = 0;

        for (index, batch) in batches.enumerate() {
            let target = batch_target(&batch, stage)?;
            let loss = self.model.compute_loss(&batch.encoder, target, &self.loss_function)?;
            if !loss.is_finite() {
                return Err(ForecastError::NonFiniteLoss { stage, epoch, batch: index });
            }
            total_loss += loss;
            count += 1;
        }

        if count == 0 {
            warn!(%stage, "no batches to evaluate");
        }
        Ok(total_loss / count.max(1) as f64)
    }

    /// Mean squared and mean absolute error over the test batches.
    pub fn test<P: DatasetProvider + ?Sized>(&self, data: &P) -> Result<TestMetrics> {
        let epoch = self.metrics_history.len();
        let (mut mse, mut mae) = (0.0, 0.0);
        let (mut batches, mut samples) = (0, 0);

        for (index, batch) in data.test_batches().enumerate() {
            let target = batch_target(&batch, Stage::Test)?;
            let predictions = self.model.forward(&batch.encoder)?;
            let batch_mse = self.model_loss(&MSELoss, &predictions, target)?;
            if !batch_mse.is_finite() {
                return Err(ForecastError::NonFiniteLoss {
                    stage: Stage::Test,
                    epoch,
                    batch: index,
                });
            }

            mse += batch_mse;
            mae += self.model_loss(&MAELoss, &predictions, target)?;
            batches += 1;
            samples += batch.len();
        }

        if batches == 0 {
            return Err(DataError::Empty("test windows".to_string()).into());
        }

        let metrics = TestMetrics {
            mse: mse / batches as f64,
            mae: mae / batches as f64,
            batches,
            samples,
        };
        info!(mse = metrics.mse, mae = metrics.mae, samples, "test finished");
        Ok(metrics)
    }

    fn model_loss<F: LossFunction>(&self, loss: &F, predictions: &Array2<f64>, target: &Array2<f64>) -> Result<f64> {
        if predictions.dim() != target.dim() {
            return Err(ForecastError::Shape {
                expected: format!("{:?}", predictions.shape()),
                got: format!("{:?}", target.shape()),
            });
        }
        Ok(loss.compute_loss(predictions, target))
    }

    /// Forecast every predict window, mapped back to the target's units.
    pub fn predict<P: DatasetProvider + ?Sized>(&self, data: &P) -> Result<Vec<GroupForecast>> {
        forecast_batches(&self.model, data.predict_dataset(), data.predict_batches())
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }
}

/// Run `model` over `batches` drawn from `dataset`, one forecast per window.
pub fn forecast_batches<M: TrainableModel>(
    model: &M,
    dataset: &WindowedDataset,
    batches: Batches<'_>,
) -> Result<Vec<GroupForecast>> {
    let n_lags = dataset.spec().n_lags;
    let mut forecasts = Vec::with_capacity(dataset.len());

    for batch in batches {
        let predictions = model.forward(&batch.encoder)?;
        for (row, window) in predictions.outer_iter().zip(batch.windows.iter()) {
            forecasts.push(GroupForecast {
                group_id: window.group_id.clone(),
                anchor: window.anchor,
                first_step: window.anchor + n_lags,
                values: row.iter().map(|&v| dataset.inverse_target(v)).collect(),
                has_target: window.has_target,
            });
        }
    }

    info!(windows = forecasts.len(), "prediction finished");
    Ok(forecasts)
}

fn batch_target(batch: &Batch, stage: Stage) -> Result<&Array2<f64>> {
    batch
        .target
        .as_ref()
        .ok_or_else(|| DataError::Empty(format!("{} batch without target windows", stage)).into())
}

/// Create a basic trainer with SGD optimizer and MSE loss
pub fn create_basic_trainer(model: LSTMForecaster, learning_rate: f64) -> Trainer<LSTMForecaster, MSELoss, SGD> {
    Trainer::new(model, MSELoss, SGD::new(learning_rate))
}

/// Create a trainer with Adam optimizer and MSE loss
pub fn create_adam_trainer(model: LSTMForecaster, learning_rate: f64) -> Trainer<LSTMForecaster, MSELoss, Adam> {
    Trainer::new(model, MSELoss, Adam::new(learning_rate))
}

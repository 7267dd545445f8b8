use serde::{Deserialize, Serialize};

use crate::training::TrainingMetrics;

/// Loss watched by [`EarlyStopper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarlyStoppingMetric {
    ValidationLoss,
    TrainLoss,
}

/// Configuration for early stopping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    /// Consecutive non-improving epochs tolerated before stopping.
    pub patience: usize,
    /// An epoch improves only when its loss is below `best - min_delta`.
    pub min_delta: f64,
    /// Roll the model back to the best epoch once training ends.
    pub restore_best_weights: bool,
    pub monitor: EarlyStoppingMetric,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        EarlyStoppingConfig {
            patience: 4,
            min_delta: 0.0,
            restore_best_weights: false,
            monitor: EarlyStoppingMetric::ValidationLoss,
        }
    }
}

/// Patience-based stopper polled once per epoch.
///
/// Keeps the best monitored loss and, when asked to, a snapshot of the model
/// taken at that epoch.
#[derive(Debug, Clone)]
pub struct EarlyStopper<M> {
    config: EarlyStoppingConfig,
    best_score: f64,
    best_epoch: Option<usize>,
    wait: usize,
    stopped_epoch: Option<usize>,
    best_weights: Option<M>,
}

impl<M: Clone> EarlyStopper<M> {
    pub fn new(config: EarlyStoppingConfig) -> Self {
        EarlyStopper {
            config,
            best_score: f64::INFINITY,
            best_epoch: None,
            wait: 0,
            stopped_epoch: None,
            best_weights: None,
        }
    }

    pub fn config(&self) -> &EarlyStoppingConfig {
        &self.config
    }

    /// Monitored value for an epoch. Validation loss falls back to the
    /// training loss when no validation pass ran.
    pub fn monitored(&self, metrics: &TrainingMetrics) -> f64 {
        match self.config.monitor {
            EarlyStoppingMetric::ValidationLoss => metrics.validation_loss.unwrap_or(metrics.train_loss),
            EarlyStoppingMetric::TrainLoss => metrics.train_loss,
        }
    }

    /// Record one epoch. Returns `(should_stop, is_best)`.
    pub fn should_stop(&mut self, metrics: &TrainingMetrics, model: &M) -> (bool, bool) {
        if self.stopped_epoch.is_some() {
            return (true, false);
        }

        let score = self.monitored(metrics);
        let is_best = score < self.best_score - self.config.min_delta;

        if is_best {
            self.best_score = score;
            self.best_epoch = Some(metrics.epoch);
            self.wait = 0;
            if self.config.restore_best_weights {
                self.best_weights = Some(model.clone());
            }
        } else {
            self.wait += 1;
            if self.wait >= self.config.patience {
                self.stopped_epoch = Some(metrics.epoch);
            }
        }

        (self.stopped_epoch.is_some(), is_best)
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    /// Consecutive epochs without improvement so far.
    pub fn wait(&self) -> usize {
        self.wait
    }

    /// Snapshot of the best model, if `restore_best_weights` is set.
    pub fn take_best_weights(&mut self) -> Option<M> {
        self.best_weights.take()
    }

    pub fn reset(&mut self) {
        self.best_score = f64::INFINITY;
        self.best_epoch = None;
        self.wait = 0;
        self.stopped_epoch = None;
        self.best_weights = None;
    }
}

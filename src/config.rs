use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::early_stopping::{EarlyStoppingConfig, EarlyStoppingMetric};
use crate::error::{ConfigError, Result};
use crate::training::TrainingConfig;

/// Settings for one forecasting run: windowing, split, model and training.
///
/// Defaults follow the multivariate solar-radiation setup: a week of lags,
/// one step ahead, 30% held out for testing and 10% of the remainder for
/// validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Encoder window length.
    pub n_lags: usize,
    /// Decoder window length.
    pub horizon: usize,
    /// Fraction of time indices held out for testing.
    pub test_size: f64,
    /// Fraction of the remaining indices held out for validation.
    pub validation_size: f64,
    pub batch_size: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub max_epochs: usize,
    pub patience: usize,
    pub min_delta: f64,
    pub learning_rate: f64,
    /// Column predicted by the model.
    pub target: String,
    /// Columns to min-max scale. `None` scales every feature but the target.
    pub scaled_columns: Option<Vec<String>>,
    /// Scale the target as well and report forecasts in original units.
    pub scale_target: bool,
    /// Maximum global gradient norm. Off by default.
    pub clip_gradient: Option<f64>,
    pub restore_best_weights: bool,
    /// Seed for weight initialisation.
    pub seed: u64,
    /// Emit an info event every `log_every` epochs.
    pub log_every: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            n_lags: 7,
            horizon: 1,
            test_size: 0.3,
            validation_size: 0.1,
            batch_size: 16,
            hidden_dim: 10,
            num_layers: 1,
            max_epochs: 100,
            patience: 4,
            min_delta: 0.0,
            learning_rate: 0.01,
            target: "Incoming Solar".to_string(),
            scaled_columns: None,
            scale_target: false,
            clip_gradient: None,
            restore_best_weights: false,
            seed: 42,
            log_every: 1,
        }
    }
}

impl ForecastConfig {
    /// Read a JSON configuration file. Missing keys take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: ForecastConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, value) in [
            ("n_lags", self.n_lags),
            ("horizon", self.horizon),
            ("batch_size", self.batch_size),
            ("hidden_dim", self.hidden_dim),
            ("num_layers", self.num_layers),
            ("max_epochs", self.max_epochs),
            ("patience", self.patience),
            ("log_every", self.log_every),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue { name });
            }
        }

        for (name, value) in [("test_size", self.test_size), ("validation_size", self.validation_size)] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::FractionOutOfRange { name, value });
            }
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidNumber {
                name: "learning_rate",
                value: self.learning_rate,
            });
        }
        if !(self.min_delta.is_finite() && self.min_delta >= 0.0) {
            return Err(ConfigError::InvalidNumber {
                name: "min_delta",
                value: self.min_delta,
            });
        }
        if let Some(clip) = self.clip_gradient {
            if !(clip.is_finite() && clip > 0.0) {
                return Err(ConfigError::InvalidNumber {
                    name: "clip_gradient",
                    value: clip,
                });
            }
        }

        Ok(())
    }

    /// Training-loop settings derived from this configuration.
    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            max_epochs: self.max_epochs,
            log_every: self.log_every,
            clip_gradient: self.clip_gradient,
            early_stopping: Some(EarlyStoppingConfig {
                patience: self.patience,
                min_delta: self.min_delta,
                restore_best_weights: self.restore_best_weights,
                monitor: EarlyStoppingMetric::ValidationLoss,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ForecastConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_fractions() {
        let config = ForecastConfig {
            test_size: 1.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::FractionOutOfRange {
                name: "test_size",
                value: 1.0
            })
        );

        let config = ForecastConfig {
            validation_size: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FractionOutOfRange { name: "validation_size", .. })
        ));
    }

    #[test]
    fn test_rejects_zero_window() {
        let config = ForecastConfig {
            horizon: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroValue { name: "horizon" }));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"n_lags": 14, "horizon": 3, "target": "value"}}"#).unwrap();

        let config = ForecastConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.n_lags, 14);
        assert_eq!(config.horizon, 3);
        assert_eq!(config.target, "value");
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.validation_size, 0.1);
    }

    #[test]
    fn test_training_config_monitors_validation() {
        let training = ForecastConfig::default().training_config();
        let early_stopping = training.early_stopping.unwrap();
        assert_eq!(early_stopping.patience, 4);
        assert_eq!(early_stopping.monitor, EarlyStoppingMetric::ValidationLoss);
        assert_eq!(training.max_epochs, 100);
        assert_eq!(training.clip_gradient, None);
    }
}

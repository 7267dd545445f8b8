use ndarray::{s, Array2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::layers::lstm_cell::LSTMCellGradients;
use crate::loss::LossFunction;
use crate::models::lstm_network::LSTMNetwork;
use crate::optimizers::Optimizer;

/// Gradient sets that can be measured and rescaled as a whole.
pub trait ParameterGradients {
    fn squared_norm(&self) -> f64;
    fn scale(&mut self, factor: f64);
}

/// Rescale `gradients` so their global L2 norm does not exceed `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_by_global_norm<G: ParameterGradients + ?Sized>(gradients: &mut G, max_norm: f64) -> f64 {
    let norm = gradients.squared_norm().sqrt();
    if norm > max_norm && norm > 0.0 {
        gradients.scale(max_norm / norm);
    }
    norm
}

/// A model the training loop can drive.
///
/// Encoder batches are `(batch, n_lags, features)`, predictions and targets
/// `(batch, horizon)`.
pub trait TrainableModel: Clone {
    type Gradients: ParameterGradients;

    fn forward(&self, encoder: &Array3<f64>) -> Result<Array2<f64>>;

    fn compute_loss<L: LossFunction + ?Sized>(&self, encoder: &Array3<f64>, target: &Array2<f64>, loss: &L) -> Result<f64> {
        let predictions = self.forward(encoder)?;
        check_target(&predictions, target)?;
        Ok(loss.compute_loss(&predictions, target))
    }

    /// Loss and parameter gradients for one batch.
    fn backward<L: LossFunction + ?Sized>(
        &self,
        encoder: &Array3<f64>,
        target: &Array2<f64>,
        loss: &L,
    ) -> Result<(f64, Self::Gradients)>;

    fn update<O: Optimizer + ?Sized>(&mut self, gradients: &Self::Gradients, optimizer: &mut O);
}

fn check_target(predictions: &Array2<f64>, target: &Array2<f64>) -> Result<()> {
    if predictions.dim() != target.dim() {
        return Err(ForecastError::Shape {
            expected: format!("{:?}", predictions.shape()),
            got: format!("{:?}", target.shape()),
        });
    }
    Ok(())
}

/// Gradients of every [`LSTMForecaster`] parameter.
#[derive(Clone, Debug)]
pub struct ForecasterGradients {
    pub lstm: Vec<LSTMCellGradients>,
    pub head: LinearGradients,
}

impl ParameterGradients for ForecasterGradients {
    fn squared_norm(&self) -> f64 {
        self.lstm.iter().map(|g| g.squared_norm()).sum::<f64>() + self.head.squared_norm()
    }

    fn scale(&mut self, factor: f64) {
        for gradients in self.lstm.iter_mut() {
            gradients.scale(factor);
        }
        self.head.scale(factor);
    }
}

/// LSTM stack followed by a linear head on the last hidden state.
///
/// Each forward pass starts from zero state, so predictions depend only on
/// the weights and the encoder window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LSTMForecaster {
    pub network: LSTMNetwork,
    pub head: LinearLayer,
    pub n_lags: usize,
    pub horizon: usize,
}

impl LSTMForecaster {
    pub fn new(input_dim: usize, hidden_dim: usize, num_layers: usize, n_lags: usize, horizon: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let network = LSTMNetwork::new(input_dim, hidden_dim, num_layers, &mut rng);
        let head = LinearLayer::new(hidden_dim, horizon, &mut rng);

        LSTMForecaster {
            network,
            head,
            n_lags,
            horizon,
        }
    }

    /// Model sized for `num_features` inputs with the run's hyperparameters.
    pub fn from_config(config: &ForecastConfig, num_features: usize) -> Self {
        LSTMForecaster::new(
            num_features,
            config.hidden_dim,
            config.num_layers,
            config.n_lags,
            config.horizon,
            config.seed,
        )
    }

    pub fn input_size(&self) -> usize {
        self.network.input_size
    }

    pub fn num_parameters(&self) -> usize {
        self.network.num_parameters() + self.head.num_parameters()
    }

    /// Split a `(batch, n_lags, features)` window into `n_lags` steps of
    /// shape `(features, batch)`.
    fn encoder_steps(&self, encoder: &Array3<f64>) -> Result<Vec<Array2<f64>>> {
        let (_, n_lags, features) = encoder.dim();
        if n_lags != self.n_lags || features != self.network.input_size {
            return Err(ForecastError::Shape {
                expected: format!("[_, {}, {}]", self.n_lags, self.network.input_size),
                got: format!("{:?}", encoder.shape()),
            });
        }

        Ok((0..n_lags).map(|t| encoder.slice(s![.., t, ..]).t().to_owned()).collect())
    }
}

impl TrainableModel for LSTMForecaster {
    type Gradients = ForecasterGradients;

    fn forward(&self, encoder: &Array3<f64>) -> Result<Array2<f64>> {
        let steps = self.encoder_steps(encoder)?;
        let last_hidden = self.network.forward_sequence(&steps);
        Ok(self.head.forward(&last_hidden).t().to_owned())
    }

    fn backward<L: LossFunction + ?Sized>(
        &self,
        encoder: &Array3<f64>,
        target: &Array2<f64>,
        loss: &L,
    ) -> Result<(f64, ForecasterGradients)> {
        let steps = self.encoder_steps(encoder)?;
        let (last_hidden, caches) = self.network.forward_sequence_with_cache(&steps);
        let predictions = self.head.forward(&last_hidden).t().to_owned();
        check_target(&predictions, target)?;

        let value = loss.compute_loss(&predictions, target);
        let d_predictions = loss.compute_gradient(&predictions, target).t().to_owned();

        let (head, d_hidden) = self.head.backward(&last_hidden, &d_predictions);
        let lstm = self.network.backward_sequence(&d_hidden, &caches);

        Ok((value, ForecasterGradients { lstm, head }))
    }

    fn update<O: Optimizer + ?Sized>(&mut self, gradients: &ForecasterGradients, optimizer: &mut O) {
        self.network.update_parameters(&gradients.lstm, optimizer);
        self.head.update_parameters(&gradients.head, optimizer, "head");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::MSELoss;
    use crate::optimizers::Adam;

    fn encoder(batch: usize, n_lags: usize, features: usize) -> Array3<f64> {
        Array3::from_shape_fn((batch, n_lags, features), |(b, t, f)| ((b * 7 + t * 3 + f) as f64 * 0.17).cos())
    }

    #[test]
    fn test_forward_shape_and_determinism() {
        let model = LSTMForecaster::new(3, 5, 2, 4, 2, 7);
        let x = encoder(6, 4, 3);

        let first = model.forward(&x).unwrap();
        assert_eq!(first.shape(), &[6, 2]);
        assert_eq!(first, model.forward(&x).unwrap());

        let same_seed = LSTMForecaster::new(3, 5, 2, 4, 2, 7);
        assert_eq!(model, same_seed);
    }

    #[test]
    fn test_batch_rows_are_independent() {
        let model = LSTMForecaster::new(2, 4, 1, 3, 1, 0);
        let x = encoder(4, 3, 2);
        let batched = model.forward(&x).unwrap();

        let single = model.forward(&x.slice(s![2..3, .., ..]).to_owned()).unwrap();
        assert!((batched[[2, 0]] - single[[0, 0]]).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let model = LSTMForecaster::new(3, 4, 1, 5, 1, 0);
        assert!(matches!(model.forward(&encoder(2, 4, 3)), Err(ForecastError::Shape { .. })));
        assert!(matches!(model.forward(&encoder(2, 5, 2)), Err(ForecastError::Shape { .. })));

        let target = Array2::zeros((2, 3));
        assert!(matches!(
            model.backward(&encoder(2, 5, 3), &target, &MSELoss),
            Err(ForecastError::Shape { .. })
        ));
    }

    #[test]
    fn test_head_gradient_matches_finite_difference() {
        let mut model = LSTMForecaster::new(2, 3, 1, 4, 2, 3);
        let x = encoder(3, 4, 2);
        let target = Array2::from_shape_fn((3, 2), |(b, h)| (b + h) as f64 * 0.1);

        let (_, gradients) = model.backward(&x, &target, &MSELoss).unwrap();

        let eps = 1e-6;
        let original = model.head.weight[[1, 2]];
        model.head.weight[[1, 2]] = original + eps;
        let plus = model.compute_loss(&x, &target, &MSELoss).unwrap();
        model.head.weight[[1, 2]] = original - eps;
        let minus = model.compute_loss(&x, &target, &MSELoss).unwrap();
        model.head.weight[[1, 2]] = original;

        assert!(((plus - minus) / (2.0 * eps) - gradients.head.weight[[1, 2]]).abs() < 1e-7);

        let original = model.network.cells()[0].w_ih[[4, 1]];
        let mut perturbed = model.clone();
        let mut cells = perturbed.network.cells().to_vec();
        cells[0].w_ih[[4, 1]] = original + eps;
        perturbed.network = LSTMNetwork::from_cells(cells.clone());
        let plus = perturbed.compute_loss(&x, &target, &MSELoss).unwrap();
        cells[0].w_ih[[4, 1]] = original - eps;
        perturbed.network = LSTMNetwork::from_cells(cells);
        let minus = perturbed.compute_loss(&x, &target, &MSELoss).unwrap();

        assert!(((plus - minus) / (2.0 * eps) - gradients.lstm[0].w_ih[[4, 1]]).abs() < 1e-7);
    }

    #[test]
    fn test_updates_reduce_loss_on_fixed_batch() {
        let mut model = LSTMForecaster::new(2, 6, 1, 4, 1, 11);
        let mut optimizer = Adam::new(0.01);
        let x = encoder(8, 4, 2);
        let target = x.slice(s![.., 3, 0..1]).to_owned();

        let initial = model.compute_loss(&x, &target, &MSELoss).unwrap();
        for _ in 0..200 {
            let (_, gradients) = model.backward(&x, &target, &MSELoss).unwrap();
            model.update(&gradients, &mut optimizer);
        }
        let trained = model.compute_loss(&x, &target, &MSELoss).unwrap();

        assert!(trained < initial * 0.5, "loss {} -> {}", initial, trained);
    }

    #[test]
    fn test_clip_by_global_norm() {
        let model = LSTMForecaster::new(2, 3, 1, 2, 1, 0);
        let x = encoder(2, 2, 2);
        let target = Array2::from_elem((2, 1), 100.0);
        let (_, mut gradients) = model.backward(&x, &target, &MSELoss).unwrap();

        let before = clip_by_global_norm(&mut gradients, 1.0);
        assert!(before > 1.0);
        assert!((gradients.squared_norm().sqrt() - 1.0).abs() < 1e-9);
    }
}

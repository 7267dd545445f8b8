use ndarray::{Array2, Zip};
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
///
/// Parameters are identified by a stable string id so stateful optimizers
/// can keep per-parameter moments.
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);
    fn learning_rate(&self) -> f64;
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
#[derive(Debug, Clone)]
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        param.scaled_add(-self.learning_rate, gradient);
    }

    fn reset(&mut self) {}

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

#[derive(Debug, Clone)]
struct AdamState {
    step: i32,
    m: Array2<f64>, // first moment estimate
    v: Array2<f64>, // second moment estimate
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected with each parameter's own step count.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    state: HashMap<String, AdamState>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            state: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let state = self.state.entry(param_id.to_string()).or_insert_with(|| AdamState {
            step: 0,
            m: Array2::zeros(param.raw_dim()),
            v: Array2::zeros(param.raw_dim()),
        });
        state.step += 1;

        state.m = self.beta1 * &state.m + (1.0 - self.beta1) * gradient;
        state.v = self.beta2 * &state.v + (1.0 - self.beta2) * &(gradient * gradient);

        let m_correction = 1.0 - self.beta1.powi(state.step);
        let v_correction = 1.0 - self.beta2.powi(state.step);

        let (lr, eps) = (self.learning_rate, self.epsilon);
        let step = Zip::from(&state.m)
            .and(&state.v)
            .map_collect(|&m, &v| lr * (m / m_correction) / ((v / v_correction).sqrt() + eps));
        *param -= &step;
    }

    fn reset(&mut self) {
        self.state.clear();
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_sgd_optimizer() {
        let mut optimizer = SGD::new(0.1);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        let expected = &original_param - 0.1 * &gradient;
        assert!((param - expected).map(|x| x.abs()).sum() < 1e-10);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut optimizer = Adam::new(0.01);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, -0.2], [0.3, 0.4]]);

        optimizer.update("test_param", &mut param, &gradient);

        // After bias correction the first step is lr * sign(g).
        let expected = arr2(&[[0.99, 2.01], [2.99, 3.99]]);
        assert!((param - expected).map(|x| x.abs()).sum() < 1e-6);
    }

    #[test]
    fn test_adam_tracks_steps_per_parameter() {
        let mut optimizer = Adam::new(0.01);
        let gradient = arr2(&[[0.5]]);

        let mut a = arr2(&[[0.0]]);
        let mut b = arr2(&[[0.0]]);
        optimizer.update("a", &mut a, &gradient);
        optimizer.update("a", &mut a, &gradient);
        optimizer.update("b", &mut b, &gradient);

        // b's first update is unaffected by the two updates to a.
        assert!((b[[0, 0]] + 0.01).abs() < 1e-6);
        assert!((a[[0, 0]] + 0.02).abs() < 1e-6);

        optimizer.reset();
        let mut c = arr2(&[[0.0]]);
        optimizer.update("a", &mut c, &gradient);
        assert!((c[[0, 0]] + 0.01).abs() < 1e-6);
    }
}

use ndarray::{s, Array2, Axis};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};

use crate::optimizers::Optimizer;

/// Holds gradients for all LSTM cell parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LSTMCellGradients {
    pub w_ih: Array2<f64>,
    pub w_hh: Array2<f64>,
    pub b_ih: Array2<f64>,
    pub b_hh: Array2<f64>,
}

impl LSTMCellGradients {
    /// Element-wise accumulation, used when summing over time steps.
    pub fn accumulate(&mut self, other: &LSTMCellGradients) {
        self.w_ih += &other.w_ih;
        self.w_hh += &other.w_hh;
        self.b_ih += &other.b_ih;
        self.b_hh += &other.b_hh;
    }

    pub fn squared_norm(&self) -> f64 {
        [&self.w_ih, &self.w_hh, &self.b_ih, &self.b_hh]
            .iter()
            .map(|g| g.iter().map(|x| x * x).sum::<f64>())
            .sum()
    }

    pub fn scale(&mut self, factor: f64) {
        self.w_ih *= factor;
        self.w_hh *= factor;
        self.b_ih *= factor;
        self.b_hh *= factor;
    }
}

/// Caches intermediate values during forward pass for efficient backward computation
#[derive(Clone, Debug)]
pub struct LSTMCellCache {
    pub input: Array2<f64>,
    pub hx: Array2<f64>,
    pub cx: Array2<f64>,
    pub input_gate: Array2<f64>,
    pub forget_gate: Array2<f64>,
    pub cell_gate: Array2<f64>,
    pub output_gate: Array2<f64>,
    pub cy: Array2<f64>,
}

/// LSTM cell with trainable parameters
///
/// Columns are batch entries: inputs are `(input_size, batch)` and states
/// `(hidden_size, batch)`. Implements the standard LSTM equations:
/// - i_t = σ(W_xi * x_t + W_hi * h_t-1 + b_i)
/// - f_t = σ(W_xf * x_t + W_hf * h_t-1 + b_f)
/// - g_t = tanh(W_xg * x_t + W_hg * h_t-1 + b_g)
/// - o_t = σ(W_xo * x_t + W_ho * h_t-1 + b_o)
/// - c_t = f_t ⊙ c_t-1 + i_t ⊙ g_t
/// - h_t = o_t ⊙ tanh(c_t)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LSTMCell {
    pub w_ih: Array2<f64>, // input-to-hidden weights (4*hidden_size, input_size)
    pub w_hh: Array2<f64>, // hidden-to-hidden weights (4*hidden_size, hidden_size)
    pub b_ih: Array2<f64>, // input-to-hidden bias (4*hidden_size, 1)
    pub b_hh: Array2<f64>, // hidden-to-hidden bias (4*hidden_size, 1)
    pub input_size: usize,
    pub hidden_size: usize,
}

impl LSTMCell {
    /// Creates a new LSTM cell with weights drawn uniformly from
    /// ±1/sqrt(hidden_size) and zero biases.
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (hidden_size as f64).sqrt();
        let dist = Uniform::new(-bound, bound);

        LSTMCell {
            w_ih: Array2::random_using((4 * hidden_size, input_size), dist, rng),
            w_hh: Array2::random_using((4 * hidden_size, hidden_size), dist, rng),
            b_ih: Array2::zeros((4 * hidden_size, 1)),
            b_hh: Array2::zeros((4 * hidden_size, 1)),
            input_size,
            hidden_size,
        }
    }

    pub fn forward(&self, input: &Array2<f64>, hx: &Array2<f64>, cx: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let (hy, cy, _) = self.forward_with_cache(input, hx, cx);
        (hy, cy)
    }

    pub fn forward_with_cache(
        &self,
        input: &Array2<f64>,
        hx: &Array2<f64>,
        cx: &Array2<f64>,
    ) -> (Array2<f64>, Array2<f64>, LSTMCellCache) {
        let h = self.hidden_size;

        // All gates at once: [input_gate, forget_gate, cell_gate, output_gate]
        let gates = &self.w_ih.dot(input) + &self.b_ih + &self.w_hh.dot(hx) + &self.b_hh;

        let input_gate = gates.slice(s![0..h, ..]).mapv(sigmoid);
        let forget_gate = gates.slice(s![h..2 * h, ..]).mapv(sigmoid);
        let cell_gate = gates.slice(s![2 * h..3 * h, ..]).mapv(f64::tanh);
        let output_gate = gates.slice(s![3 * h..4 * h, ..]).mapv(sigmoid);

        let cy = &forget_gate * cx + &input_gate * &cell_gate;
        let hy = &output_gate * &cy.mapv(f64::tanh);

        let cache = LSTMCellCache {
            input: input.clone(),
            hx: hx.clone(),
            cx: cx.clone(),
            input_gate,
            forget_gate,
            cell_gate,
            output_gate,
            cy: cy.clone(),
        };

        (hy, cy, cache)
    }

    /// Backward pass for one time step.
    ///
    /// `dhy` and `dcy` are the loss gradients flowing into this step's hidden
    /// and cell outputs. Returns (parameter_gradients, input_gradient,
    /// hidden_gradient, cell_gradient) where the last two belong to the
    /// previous time step.
    pub fn backward(
        &self,
        dhy: &Array2<f64>,
        dcy: &Array2<f64>,
        cache: &LSTMCellCache,
    ) -> (LSTMCellGradients, Array2<f64>, Array2<f64>, Array2<f64>) {
        let h = self.hidden_size;
        let batch = dhy.ncols();

        // Output gate: ∂L/∂o_t = ∂L/∂h_t ⊙ tanh(c_t)
        let tanh_cy = cache.cy.mapv(f64::tanh);
        let do_raw = &(dhy * &tanh_cy) * &cache.output_gate.mapv(|o| o * (1.0 - o));

        // Cell state gradients from both tanh and direct paths
        let dcy_total = dcy + &(dhy * &cache.output_gate * &tanh_cy.mapv(|t| 1.0 - t * t));

        // Forget gate: ∂L/∂f_t = ∂L/∂c_t ⊙ c_t-1
        let df_raw = &(&dcy_total * &cache.cx) * &cache.forget_gate.mapv(|f| f * (1.0 - f));

        // Input gate: ∂L/∂i_t = ∂L/∂c_t ⊙ g_t
        let di_raw = &(&dcy_total * &cache.cell_gate) * &cache.input_gate.mapv(|i| i * (1.0 - i));

        // Cell gate: ∂L/∂g_t = ∂L/∂c_t ⊙ i_t
        let dg_raw = &(&dcy_total * &cache.input_gate) * &cache.cell_gate.mapv(|g| 1.0 - g * g);

        let mut dgates = Array2::zeros((4 * h, batch));
        dgates.slice_mut(s![0..h, ..]).assign(&di_raw);
        dgates.slice_mut(s![h..2 * h, ..]).assign(&df_raw);
        dgates.slice_mut(s![2 * h..3 * h, ..]).assign(&dg_raw);
        dgates.slice_mut(s![3 * h..4 * h, ..]).assign(&do_raw);

        // Bias gradients sum over the batch columns
        let db = dgates.sum_axis(Axis(1)).insert_axis(Axis(1));

        let gradients = LSTMCellGradients {
            w_ih: dgates.dot(&cache.input.t()),
            w_hh: dgates.dot(&cache.hx.t()),
            b_ih: db.clone(),
            b_hh: db,
        };

        let dx = self.w_ih.t().dot(&dgates);
        let dhx = self.w_hh.t().dot(&dgates);
        let dcx = &dcy_total * &cache.forget_gate;

        (gradients, dx, dhx, dcx)
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> LSTMCellGradients {
        LSTMCellGradients {
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            b_ih: Array2::zeros(self.b_ih.raw_dim()),
            b_hh: Array2::zeros(self.b_hh.raw_dim()),
        }
    }

    /// Apply gradients using the provided optimizer
    pub fn update_parameters<O: Optimizer + ?Sized>(
        &mut self,
        gradients: &LSTMCellGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        optimizer.update(&format!("{}_w_ih", prefix), &mut self.w_ih, &gradients.w_ih);
        optimizer.update(&format!("{}_w_hh", prefix), &mut self.w_hh, &gradients.w_hh);
        optimizer.update(&format!("{}_b_ih", prefix), &mut self.b_ih, &gradients.b_ih);
        optimizer.update(&format!("{}_b_hh", prefix), &mut self.b_hh, &gradients.b_hh);
    }

    pub fn num_parameters(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.b_ih.len() + self.b_hh.len()
    }
}

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

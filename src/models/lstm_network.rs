use ndarray::Array2;
use ndarray_rand::rand::Rng;
use serde::{Deserialize, Serialize};

use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients};
use crate::optimizers::Optimizer;

/// Holds cached values for all layers at one time step
#[derive(Clone, Debug)]
pub struct LSTMNetworkCache {
    pub cell_caches: Vec<LSTMCellCache>,
}

/// Multi-layer LSTM network for sequence modeling
///
/// Stacks multiple LSTM cells where the output of layer i becomes
/// the input to layer i+1. Every sequence pass starts from zero hidden and
/// cell state, so nothing carries over between calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LSTMNetwork {
    cells: Vec<LSTMCell>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
}

impl LSTMNetwork {
    /// Creates a new multi-layer LSTM network
    ///
    /// First layer accepts `input_size` dimensions, subsequent layers
    /// accept `hidden_size` dimensions from the previous layer.
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, num_layers: usize, rng: &mut R) -> Self {
        let cells = (0..num_layers)
            .map(|i| {
                let layer_input_size = if i == 0 { input_size } else { hidden_size };
                LSTMCell::new(layer_input_size, hidden_size, rng)
            })
            .collect();

        LSTMNetwork {
            cells,
            input_size,
            hidden_size,
            num_layers,
        }
    }

    /// Creates a network from existing cells
    pub fn from_cells(cells: Vec<LSTMCell>) -> Self {
        let input_size = cells.first().map(|c| c.input_size).unwrap_or(0);
        let hidden_size = cells.first().map(|c| c.hidden_size).unwrap_or(0);
        let num_layers = cells.len();
        LSTMNetwork {
            cells,
            input_size,
            hidden_size,
            num_layers,
        }
    }

    pub fn cells(&self) -> &[LSTMCell] {
        &self.cells
    }

    /// One time step through every layer.
    ///
    /// `states` holds `(h, c)` per layer and is replaced by the new states.
    pub fn forward_step_with_cache(
        &self,
        input: &Array2<f64>,
        states: &mut [(Array2<f64>, Array2<f64>)],
    ) -> LSTMNetworkCache {
        let mut current_input = input.clone();
        let mut cell_caches = Vec::with_capacity(self.num_layers);

        for (cell, state) in self.cells.iter().zip(states.iter_mut()) {
            let (hy, cy, cache) = cell.forward_with_cache(&current_input, &state.0, &state.1);
            cell_caches.push(cache);

            // Layer i+1 input is layer i hidden output
            current_input = hy.clone();
            *state = (hy, cy);
        }

        LSTMNetworkCache { cell_caches }
    }

    fn zero_states(&self, batch: usize) -> Vec<(Array2<f64>, Array2<f64>)> {
        (0..self.num_layers)
            .map(|_| {
                (
                    Array2::zeros((self.hidden_size, batch)),
                    Array2::zeros((self.hidden_size, batch)),
                )
            })
            .collect()
    }

    /// Run a sequence of `(input_size, batch)` steps and return the top
    /// layer's last hidden state, `(hidden_size, batch)`.
    pub fn forward_sequence(&self, sequence: &[Array2<f64>]) -> Array2<f64> {
        self.forward_sequence_with_cache(sequence).0
    }

    /// Process an entire sequence with caching for training
    pub fn forward_sequence_with_cache(&self, sequence: &[Array2<f64>]) -> (Array2<f64>, Vec<LSTMNetworkCache>) {
        let batch = sequence.first().map(|x| x.ncols()).unwrap_or(0);
        let mut states = self.zero_states(batch);
        let caches: Vec<LSTMNetworkCache> = sequence
            .iter()
            .map(|input| self.forward_step_with_cache(input, &mut states))
            .collect();

        let last_hidden = states
            .pop()
            .map(|(h, _)| h)
            .unwrap_or_else(|| Array2::zeros((self.hidden_size, batch)));
        (last_hidden, caches)
    }

    /// Backpropagation through time from the gradient of the last hidden
    /// state of the top layer.
    ///
    /// Gradients are accumulated over every time step and layer; the
    /// result is ordered like the layers.
    pub fn backward_sequence(&self, d_last_hidden: &Array2<f64>, caches: &[LSTMNetworkCache]) -> Vec<LSTMCellGradients> {
        let batch = d_last_hidden.ncols();
        let mut gradients = self.zero_gradients();
        let mut states = self.zero_states(batch);
        if let Some(top) = states.last_mut() {
            top.0 = d_last_hidden.clone();
        }

        for cache in caches.iter().rev() {
            let mut from_above: Option<Array2<f64>> = None;

            for (layer, cell) in self.cells.iter().enumerate().rev() {
                let (dh_next, dc_next) = &states[layer];
                let dhy = match from_above.take() {
                    Some(dx) => dh_next + &dx,
                    None => dh_next.clone(),
                };

                let (step_gradients, dx, dhx, dcx) = cell.backward(&dhy, dc_next, &cache.cell_caches[layer]);
                gradients[layer].accumulate(&step_gradients);

                states[layer] = (dhx, dcx);
                from_above = Some(dx);
            }
        }

        gradients
    }

    /// Update parameters for all layers using computed gradients
    pub fn update_parameters<O: Optimizer + ?Sized>(&mut self, gradients: &[LSTMCellGradients], optimizer: &mut O) {
        for (i, (cell, cell_gradients)) in self.cells.iter_mut().zip(gradients.iter()).enumerate() {
            let prefix = format!("layer_{}", i);
            cell.update_parameters(cell_gradients, optimizer, &prefix);
        }
    }

    /// Initialize zero gradients for all layers
    pub fn zero_gradients(&self) -> Vec<LSTMCellGradients> {
        self.cells.iter().map(|cell| cell.zero_gradients()).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.cells.iter().map(|c| c.num_parameters()).sum()
    }
}

use ndarray::{Array2, Axis};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};

use crate::optimizers::Optimizer;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

impl LinearGradients {
    pub fn squared_norm(&self) -> f64 {
        self.weight.iter().chain(self.bias.iter()).map(|x| x * x).sum()
    }

    pub fn scale(&mut self, factor: f64) {
        self.weight *= factor;
        self.bias *= factor;
    }
}

/// A fully connected (linear/dense) layer
///
/// Performs the transformation: output = weight * input + bias
/// where weight has shape (output_size, input_size) and bias has shape (output_size, 1).
/// Inputs are `(input_size, batch)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearLayer {
    pub weight: Array2<f64>, // (output_size, input_size)
    pub bias: Array2<f64>,   // (output_size, 1)
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    /// Create a new linear layer with Xavier/Glorot uniform initialization
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let bound = (6.0 / (input_size + output_size) as f64).sqrt();

        LinearLayer {
            weight: Array2::random_using((output_size, input_size), Uniform::new(-bound, bound), rng),
            bias: Array2::zeros((output_size, 1)),
            input_size,
            output_size,
        }
    }

    /// Create a new linear layer with custom initialization
    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Self {
        let (output_size, input_size) = weight.dim();
        assert_eq!(bias.shape(), &[output_size, 1], "Bias shape must be (output_size, 1)");

        LinearLayer {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    /// Forward pass: `(input_size, batch)` to `(output_size, batch)`
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        &self.weight.dot(input) + &self.bias
    }

    /// Backward pass given the forward input and the output gradient.
    ///
    /// Returns (parameter_gradients, input_gradient).
    pub fn backward(&self, input: &Array2<f64>, grad_output: &Array2<f64>) -> (LinearGradients, Array2<f64>) {
        let gradients = LinearGradients {
            weight: grad_output.dot(&input.t()),
            bias: grad_output.sum_axis(Axis(1)).insert_axis(Axis(1)),
        };
        let input_grad = self.weight.t().dot(grad_output);

        (gradients, input_grad)
    }

    /// Update parameters using the provided optimizer
    pub fn update_parameters<O: Optimizer + ?Sized>(&mut self, gradients: &LinearGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::SGD;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_layer_creation() {
        let layer = LinearLayer::new(10, 5, &mut StdRng::seed_from_u64(0));
        assert_eq!(layer.weight.shape(), &[5, 10]);
        assert_eq!(layer.bias.shape(), &[5, 1]);
        assert_eq!(layer.num_parameters(), 55);
    }

    #[test]
    fn test_linear_layer_forward() {
        let layer = LinearLayer::from_weights(arr2(&[[1.0, 2.0, 3.0]]), arr2(&[[0.5]]));
        let input = arr2(&[[1.0, 0.0], [1.0, 1.0], [1.0, -1.0]]); // (3, 2)

        let output = layer.forward(&input);
        assert_eq!(output, arr2(&[[6.5, -0.5]]));
    }

    #[test]
    fn test_linear_layer_backward() {
        let layer = LinearLayer::new(3, 2, &mut StdRng::seed_from_u64(1));
        let input = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let grad_output = arr2(&[[1.0, 1.0], [1.0, 1.0]]);

        let (gradients, input_grad) = layer.backward(&input, &grad_output);

        assert_eq!(gradients.weight, arr2(&[[3.0, 7.0, 11.0], [3.0, 7.0, 11.0]]));
        assert_eq!(gradients.bias, arr2(&[[2.0], [2.0]]));
        assert_eq!(input_grad.shape(), &[3, 2]);
    }

    #[test]
    fn test_linear_layer_with_optimizer() {
        let mut layer = LinearLayer::from_weights(arr2(&[[0.0, 0.0]]), arr2(&[[0.0]]));
        let mut optimizer = SGD::new(0.1);

        let input = arr2(&[[1.0], [2.0]]);
        let target = arr2(&[[3.0]]);

        let grad_output = &layer.forward(&input) - &target;
        let (gradients, _) = layer.backward(&input, &grad_output);
        layer.update_parameters(&gradients, &mut optimizer, "head");

        let expected = arr2(&[[0.3, 0.6]]);
        assert!(layer.weight.iter().zip(expected.iter()).all(|(a, b)| (a - b).abs() < 1e-12));
        assert!((layer.bias[[0, 0]] - 0.3).abs() < 1e-12);
    }
}

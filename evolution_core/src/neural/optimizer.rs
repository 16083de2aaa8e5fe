//! Plain SGD step shared by the parameterized layers.

use ndarray::{Array, Array1, Dimension, Zip};
use serde::{Deserialize, Serialize};

/// Stochastic gradient descent with L2 weight decay.
///
/// Implements the update rule:
/// ```text
/// grad = sum_of_sample_grads / batch_size + weight_decay * param
/// param = param - learning_rate * grad
/// ```
/// Biases use the same rule without the decay term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SgdSettings {
    /// Step size for parameter updates
    pub learning_rate: f64,
    /// L2 regularization strength
    pub weight_decay: f64,
}

impl SgdSettings {
    pub fn new(learning_rate: f64, weight_decay: f64) -> Self {
        Self {
            learning_rate,
            weight_decay,
        }
    }

    /// Apply one averaged, decayed update to a weight array.
    pub fn step<D: Dimension>(
        &self,
        param: &mut Array<f64, D>,
        grad_sum: &Array<f64, D>,
        batch_size: usize,
    ) {
        if batch_size == 0 {
            return;
        }
        let scale = 1.0 / batch_size as f64;
        let lr = self.learning_rate;
        let decay = self.weight_decay;
        Zip::from(param).and(grad_sum).for_each(|p, &g| {
            *p -= lr * (g * scale + decay * *p);
        });
    }

    /// Apply one averaged update to a bias vector.
    pub fn step_bias(&self, bias: &mut Array1<f64>, grad_sum: &Array1<f64>, batch_size: usize) {
        if batch_size == 0 {
            return;
        }
        let scale = self.learning_rate / batch_size as f64;
        bias.scaled_add(-scale, grad_sum);
    }
}

impl Default for SgdSettings {
    fn default() -> Self {
        Self::new(0.01, 1e-4)
    }
}

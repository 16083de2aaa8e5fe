//! Fully-connected layer over the flattened previous output.

use ndarray::{Array1, Array2, Array3, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::activation::Activation;
use super::init::WeightInit;
use super::layer::Shape;
use super::optimizer::SgdSettings;
use crate::error::{NetworkError, NetworkResult};

/// Dense layer. Inputs are flattened channel-major, then row-major; outputs
/// have shape `(outputs, 1, 1)`.
#[derive(Clone, Serialize, Deserialize)]
pub struct FullyConnectedLayer {
    /// `[in][out]`
    weights: Array2<f64>,
    biases: Array1<f64>,
    activation: Activation,
    input_shape: Shape,
    sgd: SgdSettings,
    #[serde(skip)]
    cached_inputs: Option<Vec<Array1<f64>>>,
    #[serde(skip)]
    cached_pre_activations: Option<Vec<Array1<f64>>>,
}

impl FullyConnectedLayer {
    pub fn new<R: Rng + ?Sized>(
        input_shape: Shape,
        outputs: usize,
        activation: Activation,
        sgd: SgdSettings,
        rng: &mut R,
    ) -> NetworkResult<Self> {
        let inputs = input_shape.elements();
        if inputs == 0 || outputs == 0 {
            return Err(NetworkError::invalid(
                "FullyConnected",
                format!("cannot connect {inputs} inputs to {outputs} outputs"),
            ));
        }

        let init = WeightInit::for_activation(activation, inputs, outputs);
        let weights = Array2::from_shape_fn((inputs, outputs), |_| init.sample(rng));

        Ok(Self {
            weights,
            biases: Array1::zeros(outputs),
            activation,
            input_shape,
            sgd,
            cached_inputs: None,
            cached_pre_activations: None,
        })
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut Array2<f64> {
        &mut self.weights
    }

    pub fn biases(&self) -> &Array1<f64> {
        &self.biases
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    pub fn output_shape(&self) -> Shape {
        Shape::new(self.biases.len(), 1, 1)
    }

    pub fn outputs(&self) -> usize {
        self.biases.len()
    }

    /// Weight count only, matching how architectures are scored.
    pub fn parameter_count(&self) -> usize {
        self.weights.len()
    }

    pub fn forward_batch(&mut self, batch: &[Array3<f64>]) -> NetworkResult<Vec<Array3<f64>>> {
        let mut inputs = Vec::with_capacity(batch.len());
        let mut pre_activations = Vec::with_capacity(batch.len());
        let mut outputs = Vec::with_capacity(batch.len());

        for sample in batch {
            self.input_shape.check(sample)?;
            let x: Array1<f64> = sample.iter().copied().collect();

            let mut z = self.biases.clone();
            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                z.scaled_add(xi, &self.weights.row(i));
            }

            let activated: Array1<f64> = z.mapv(|v| self.activation.forward(v));
            outputs.push(to_column(activated));
            pre_activations.push(z);
            inputs.push(x);
        }

        self.cached_inputs = Some(inputs);
        self.cached_pre_activations = Some(pre_activations);
        Ok(outputs)
    }

    pub fn backward_batch(
        &mut self,
        grad_outputs: &[Array3<f64>],
    ) -> NetworkResult<Vec<Array3<f64>>> {
        let missing = || NetworkError::MissingForwardCache {
            layer: "FullyConnected".to_string(),
        };
        let inputs = self.cached_inputs.take().ok_or_else(missing)?;
        let pre_activations = self.cached_pre_activations.take().ok_or_else(missing)?;
        if grad_outputs.len() != inputs.len() {
            return Err(NetworkError::BatchMismatch {
                expected: inputs.len(),
                got: grad_outputs.len(),
            });
        }

        let mut weight_grads = Array2::<f64>::zeros(self.weights.raw_dim());
        let mut bias_grads = Array1::<f64>::zeros(self.biases.len());
        let mut input_grads = Vec::with_capacity(inputs.len());

        for ((x, z), grad) in inputs.iter().zip(&pre_activations).zip(grad_outputs) {
            if grad.len() != self.outputs() {
                return Err(NetworkError::InputShape {
                    expected: self.outputs(),
                    got: grad.len(),
                });
            }
            let activation = self.activation;
            let g: Array1<f64> = grad.iter().copied().collect();
            let delta = Zip::from(&g)
                .and(z)
                .map_collect(|&g, &z| g * activation.backward(z));

            let dx = self.weights.dot(&delta);
            input_grads.push(
                dx.into_shape(self.input_shape.dims())
                    .map_err(|_| NetworkError::InputShape {
                        expected: self.input_shape.elements(),
                        got: self.weights.nrows(),
                    })?,
            );

            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                weight_grads.row_mut(i).scaled_add(xi, &delta);
            }
            bias_grads += &delta;
        }

        let batch_size = inputs.len();
        self.sgd.step(&mut self.weights, &weight_grads, batch_size);
        self.sgd.step_bias(&mut self.biases, &bias_grads, batch_size);

        Ok(input_grads)
    }

    /// Drops the batch kept for `backward_batch`.
    pub fn clear_cache(&mut self) {
        self.cached_inputs = None;
        self.cached_pre_activations = None;
    }
}

fn to_column(values: Array1<f64>) -> Array3<f64> {
    let n = values.len();
    Array3::from_shape_fn((n, 1, 1), |(i, _, _)| values[i])
}

//! 2-D convolution layer with zero padding and stride.

use ndarray::{s, Array1, Array2, Array3, Array4, ArrayView2, ArrayViewMut2, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::activation::Activation;
use super::init::WeightInit;
use super::layer::Shape;
use super::optimizer::SgdSettings;
use crate::error::{NetworkError, NetworkResult};

/// Learned bank of square filters slid over every input channel.
///
/// # Shapes
///
/// ```text
/// filters: [filters][in_channels][k][k]
/// input:   [in_channels][rows][cols]
/// output:  [filters][(rows - k + 2p) / s + 1][(cols - k + 2p) / s + 1]
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ConvolutionLayer {
    filters: Array4<f64>,
    biases: Array1<f64>,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    activation: Activation,
    input_shape: Shape,
    output_shape: Shape,
    sgd: SgdSettings,
    /// Zero-padded inputs of the last forward batch
    #[serde(skip)]
    cached_inputs: Option<Vec<Array3<f64>>>,
    /// Pre-activation outputs of the last forward batch
    #[serde(skip)]
    cached_pre_activations: Option<Vec<Array3<f64>>>,
}

impl ConvolutionLayer {
    /// Creates a convolution layer with He or Xavier initialized filters.
    ///
    /// # Arguments
    ///
    /// * `input_shape` - Shape produced by the previous layer
    /// * `filter_count` - Number of output channels
    /// * `kernel_size` - Side length of each square filter
    /// * `stride` - Step between filter positions
    /// * `padding` - Zero border added on every side
    /// * `activation` - Element-wise activation after the affine step
    /// * `sgd` - Learning rate and L2 strength
    /// * `rng` - Source for the initial weights
    ///
    /// # Returns
    ///
    /// `NetworkError::InvalidArchitecture` when the padded input is smaller
    /// than the kernel or any size argument is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: Rng + ?Sized>(
        input_shape: Shape,
        filter_count: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        activation: Activation,
        sgd: SgdSettings,
        rng: &mut R,
    ) -> NetworkResult<Self> {
        let name = "Convolution";
        if filter_count == 0 || kernel_size == 0 || stride == 0 {
            return Err(NetworkError::invalid(
                name,
                "filters, kernel size and stride must be positive",
            ));
        }
        if input_shape.channels == 0 {
            return Err(NetworkError::invalid(name, "input has no channels"));
        }
        let padded_rows = input_shape.rows + 2 * padding;
        let padded_cols = input_shape.cols + 2 * padding;
        if padded_rows < kernel_size || padded_cols < kernel_size {
            return Err(NetworkError::invalid(
                name,
                format!(
                    "kernel {kernel_size}x{kernel_size} exceeds padded input {padded_rows}x{padded_cols}"
                ),
            ));
        }

        let output_shape = Shape::new(
            filter_count,
            output_size(input_shape.rows, kernel_size, padding, stride),
            output_size(input_shape.cols, kernel_size, padding, stride),
        );

        let area = kernel_size * kernel_size;
        let init = WeightInit::for_activation(
            activation,
            area * input_shape.channels,
            area * filter_count,
        );
        let filters = Array4::from_shape_fn(
            (filter_count, input_shape.channels, kernel_size, kernel_size),
            |_| init.sample(rng),
        );

        Ok(Self {
            filters,
            biases: Array1::zeros(filter_count),
            kernel_size,
            stride,
            padding,
            activation,
            input_shape,
            output_shape,
            sgd,
            cached_inputs: None,
            cached_pre_activations: None,
        })
    }

    pub fn filters(&self) -> &Array4<f64> {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut Array4<f64> {
        &mut self.filters
    }

    pub fn biases(&self) -> &Array1<f64> {
        &self.biases
    }

    pub fn filter_count(&self) -> usize {
        self.output_shape.channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    pub fn output_shape(&self) -> Shape {
        self.output_shape
    }

    pub fn parameter_count(&self) -> usize {
        self.filters.len() + self.biases.len()
    }

    fn pad(&self, input: &Array3<f64>) -> Array3<f64> {
        if self.padding == 0 {
            return input.clone();
        }
        let p = self.padding;
        let (channels, rows, cols) = input.dim();
        let mut padded = Array3::zeros((channels, rows + 2 * p, cols + 2 * p));
        padded
            .slice_mut(s![.., p..p + rows, p..p + cols])
            .assign(input);
        padded
    }

    /// Runs the filters over every sample, caching what the backward pass needs.
    pub fn forward_batch(&mut self, batch: &[Array3<f64>]) -> NetworkResult<Vec<Array3<f64>>> {
        let mut padded_inputs = Vec::with_capacity(batch.len());
        let mut pre_activations = Vec::with_capacity(batch.len());
        let mut outputs = Vec::with_capacity(batch.len());

        for input in batch {
            self.input_shape.check(input)?;
            let padded = self.pad(input);
            let z = self.correlate(&padded);
            outputs.push(z.mapv(|v| self.activation.forward(v)));
            pre_activations.push(z);
            padded_inputs.push(padded);
        }

        self.cached_inputs = Some(padded_inputs);
        self.cached_pre_activations = Some(pre_activations);
        Ok(outputs)
    }

    fn correlate(&self, padded: &Array3<f64>) -> Array3<f64> {
        let k = self.kernel_size;
        let s = self.stride;
        let out = self.output_shape;
        let mut z = Array3::zeros(out.dims());

        for f in 0..out.channels {
            let filter = self.filters.slice(s![f, .., .., ..]);
            let bias = self.biases[f];
            for i in 0..out.rows {
                for j in 0..out.cols {
                    let window = padded.slice(s![.., i * s..i * s + k, j * s..j * s + k]);
                    let sum: f64 = window
                        .iter()
                        .zip(filter.iter())
                        .map(|(a, w)| a * w)
                        .sum();
                    z[[f, i, j]] = bias + sum;
                }
            }
        }
        z
    }

    /// Propagates `grad_outputs` back, updates filters and biases, and returns
    /// the gradient with respect to each unpadded input.
    pub fn backward_batch(
        &mut self,
        grad_outputs: &[Array3<f64>],
    ) -> NetworkResult<Vec<Array3<f64>>> {
        let missing = || NetworkError::MissingForwardCache {
            layer: "Convolution".to_string(),
        };
        let inputs = self.cached_inputs.take().ok_or_else(missing)?;
        let pre_activations = self.cached_pre_activations.take().ok_or_else(missing)?;
        if grad_outputs.len() != inputs.len() {
            return Err(NetworkError::BatchMismatch {
                expected: inputs.len(),
                got: grad_outputs.len(),
            });
        }

        let mut filter_grads = Array4::<f64>::zeros(self.filters.raw_dim());
        let mut bias_grads = Array1::<f64>::zeros(self.biases.len());
        let mut input_grads = Vec::with_capacity(inputs.len());

        for ((padded, z), grad) in inputs.iter().zip(&pre_activations).zip(grad_outputs) {
            self.output_shape.check(grad)?;
            let activation = self.activation;
            let delta = Zip::from(grad)
                .and(z)
                .map_collect(|&g, &z| g * activation.backward(z));

            let (_, padded_rows, padded_cols) = padded.dim();
            let mut padded_grad =
                Array3::<f64>::zeros((self.input_shape.channels, padded_rows, padded_cols));

            for f in 0..self.output_shape.channels {
                let spaced = space(delta.slice(s![f, .., ..]), self.stride);
                bias_grads[f] += spaced.sum();

                for ch in 0..self.input_shape.channels {
                    let weight_grad = correlate_valid(
                        padded.slice(s![ch, .., ..]),
                        spaced.view(),
                        self.kernel_size,
                    );
                    filter_grads
                        .slice_mut(s![f, ch, .., ..])
                        .scaled_add(1.0, &weight_grad);

                    full_convolve_into(
                        spaced.view(),
                        self.filters.slice(s![f, ch, .., ..]),
                        &mut padded_grad.slice_mut(s![ch, .., ..]),
                    );
                }
            }

            let p = self.padding;
            input_grads.push(
                padded_grad
                    .slice(s![
                        ..,
                        p..p + self.input_shape.rows,
                        p..p + self.input_shape.cols
                    ])
                    .to_owned(),
            );
        }

        let batch_size = inputs.len();
        self.sgd.step(&mut self.filters, &filter_grads, batch_size);
        self.sgd.step_bias(&mut self.biases, &bias_grads, batch_size);

        Ok(input_grads)
    }

    /// Drops the batch kept for `backward_batch`.
    pub fn clear_cache(&mut self) {
        self.cached_inputs = None;
        self.cached_pre_activations = None;
    }
}

/// Output side length of a convolution: `floor((n - k + 2p) / s) + 1`.
pub fn output_size(input: usize, kernel: usize, padding: usize, stride: usize) -> usize {
    (input + 2 * padding - kernel) / stride + 1
}

/// Inserts `stride - 1` zeros between neighbouring entries of `delta`.
fn space(delta: ArrayView2<f64>, stride: usize) -> Array2<f64> {
    if stride == 1 {
        return delta.to_owned();
    }
    let (rows, cols) = delta.dim();
    let mut spaced = Array2::zeros(((rows - 1) * stride + 1, (cols - 1) * stride + 1));
    for ((i, j), &v) in delta.indexed_iter() {
        spaced[[i * stride, j * stride]] = v;
    }
    spaced
}

/// `out[dx][dy] = Σ kernel[u][v] · input[u + dx][v + dy]` for a `k x k` result.
fn correlate_valid(input: ArrayView2<f64>, kernel: ArrayView2<f64>, k: usize) -> Array2<f64> {
    let mut out = Array2::zeros((k, k));
    for ((u, v), &d) in kernel.indexed_iter() {
        if d == 0.0 {
            continue;
        }
        out.scaled_add(d, &input.slice(s![u..u + k, v..v + k]));
    }
    out
}

/// Adds the full convolution of `spaced` with `filter` into the top-left
/// corner of `out`: `out[u + dx][v + dy] += spaced[u][v] · filter[dx][dy]`.
fn full_convolve_into(
    spaced: ArrayView2<f64>,
    filter: ArrayView2<f64>,
    out: &mut ArrayViewMut2<f64>,
) {
    let (k, _) = filter.dim();
    for ((u, v), &d) in spaced.indexed_iter() {
        if d == 0.0 {
            continue;
        }
        out.slice_mut(s![u..u + k, v..v + k]).scaled_add(d, &filter);
    }
}

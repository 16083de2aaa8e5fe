//! Closed set of layer kinds sharing one batched forward/backward contract.

use std::fmt;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use super::convolution::ConvolutionLayer;
use super::dense::FullyConnectedLayer;
use super::pooling::MaxPoolLayer;
use crate::error::{NetworkError, NetworkResult};

/// Feature-map dimensions `(channels, rows, cols)` flowing between layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub channels: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Shape {
    pub const fn new(channels: usize, rows: usize, cols: usize) -> Self {
        Self {
            channels,
            rows,
            cols,
        }
    }

    pub fn elements(&self) -> usize {
        self.channels * self.rows * self.cols
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.channels, self.rows, self.cols)
    }

    /// Rejects a sample whose dimensions differ from this shape.
    pub fn check(&self, sample: &Array3<f64>) -> NetworkResult<()> {
        if sample.dim() == self.dims() {
            Ok(())
        } else {
            Err(NetworkError::InputShape {
                expected: self.elements(),
                got: sample.len(),
            })
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.rows, self.cols)
    }
}

/// One link in a network's layer chain.
#[derive(Clone, Serialize, Deserialize)]
pub enum Layer {
    Convolution(ConvolutionLayer),
    MaxPool(MaxPoolLayer),
    FullyConnected(FullyConnectedLayer),
}

impl Layer {
    /// Forward a batch, replacing whatever the layer cached last time.
    pub fn forward_batch(&mut self, batch: &[Array3<f64>]) -> NetworkResult<Vec<Array3<f64>>> {
        match self {
            Layer::Convolution(layer) => layer.forward_batch(batch),
            Layer::MaxPool(layer) => layer.forward_batch(batch),
            Layer::FullyConnected(layer) => layer.forward_batch(batch),
        }
    }

    /// Backward pass for the batch seen by the last `forward_batch`.
    ///
    /// Parameterized layers update themselves in place. The returned
    /// gradients are with respect to this layer's inputs.
    pub fn backward_batch(
        &mut self,
        grad_outputs: &[Array3<f64>],
    ) -> NetworkResult<Vec<Array3<f64>>> {
        match self {
            Layer::Convolution(layer) => layer.backward_batch(grad_outputs),
            Layer::MaxPool(layer) => layer.backward_batch(grad_outputs),
            Layer::FullyConnected(layer) => layer.backward_batch(grad_outputs),
        }
    }

    pub fn clear_cache(&mut self) {
        match self {
            Layer::Convolution(layer) => layer.clear_cache(),
            Layer::MaxPool(layer) => layer.clear_cache(),
            Layer::FullyConnected(layer) => layer.clear_cache(),
        }
    }

    pub fn input_shape(&self) -> Shape {
        match self {
            Layer::Convolution(layer) => layer.input_shape(),
            Layer::MaxPool(layer) => layer.input_shape(),
            Layer::FullyConnected(layer) => layer.input_shape(),
        }
    }

    pub fn output_shape(&self) -> Shape {
        match self {
            Layer::Convolution(layer) => layer.output_shape(),
            Layer::MaxPool(layer) => layer.output_shape(),
            Layer::FullyConnected(layer) => layer.output_shape(),
        }
    }

    pub fn parameter_count(&self) -> usize {
        match self {
            Layer::Convolution(layer) => layer.parameter_count(),
            Layer::MaxPool(_) => 0,
            Layer::FullyConnected(layer) => layer.parameter_count(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Convolution(_) => "Convolution",
            Layer::MaxPool(_) => "MaxPool",
            Layer::FullyConnected(_) => "FullyConnected",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Convolution(c) => write!(
                f,
                "Convolution {} filters {}x{} stride {} padding {} + {}",
                c.filter_count(),
                c.kernel_size(),
                c.kernel_size(),
                c.stride(),
                c.padding(),
                c.activation()
            ),
            Layer::MaxPool(p) => write!(
                f,
                "MaxPool {}x{} stride {}",
                p.window(),
                p.window(),
                p.stride()
            ),
            Layer::FullyConnected(d) => {
                write!(f, "FullyConnected {} + {}", d.outputs(), d.activation())
            }
        }
    }
}

//! Max pooling with arg-max routing in the backward pass.

use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};

use super::layer::Shape;
use crate::error::{NetworkError, NetworkResult};

/// Square max-pooling window applied to every channel independently.
#[derive(Clone, Serialize, Deserialize)]
pub struct MaxPoolLayer {
    window: usize,
    stride: usize,
    input_shape: Shape,
    output_shape: Shape,
    /// Absolute (row, col) of each window's winner, per sample
    #[serde(skip)]
    winners: Option<Vec<Array3<(usize, usize)>>>,
}

impl MaxPoolLayer {
    /// Creates a pooling layer over `input_shape`.
    ///
    /// Fails with `NetworkError::InvalidArchitecture` when the window does
    /// not fit in the input or a size is zero.
    pub fn new(input_shape: Shape, window: usize, stride: usize) -> NetworkResult<Self> {
        if window == 0 || stride == 0 {
            return Err(NetworkError::invalid(
                "MaxPool",
                "window and stride must be positive",
            ));
        }
        if input_shape.rows < window || input_shape.cols < window {
            return Err(NetworkError::invalid(
                "MaxPool",
                format!(
                    "window {window}x{window} exceeds input {}x{}",
                    input_shape.rows, input_shape.cols
                ),
            ));
        }

        let output_shape = Shape::new(
            input_shape.channels,
            (input_shape.rows - window) / stride + 1,
            (input_shape.cols - window) / stride + 1,
        );

        Ok(Self {
            window,
            stride,
            input_shape,
            output_shape,
            winners: None,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    pub fn output_shape(&self) -> Shape {
        self.output_shape
    }

    pub fn forward_batch(&mut self, batch: &[Array3<f64>]) -> NetworkResult<Vec<Array3<f64>>> {
        let mut outputs = Vec::with_capacity(batch.len());
        let mut winners = Vec::with_capacity(batch.len());

        for input in batch {
            self.input_shape.check(input)?;
            let (pooled, positions) = self.pool(input);
            outputs.push(pooled);
            winners.push(positions);
        }

        self.winners = Some(winners);
        Ok(outputs)
    }

    fn pool(&self, input: &Array3<f64>) -> (Array3<f64>, Array3<(usize, usize)>) {
        let out = self.output_shape;
        let mut pooled = Array3::zeros(out.dims());
        let mut positions = Array3::from_elem(out.dims(), (0, 0));

        for ch in 0..out.channels {
            for i in 0..out.rows {
                for j in 0..out.cols {
                    let r0 = i * self.stride;
                    let c0 = j * self.stride;
                    let mut best = f64::NEG_INFINITY;
                    let mut winner = (r0, c0);
                    for r in r0..r0 + self.window {
                        for c in c0..c0 + self.window {
                            let v = input[[ch, r, c]];
                            if v > best {
                                best = v;
                                winner = (r, c);
                            }
                        }
                    }
                    pooled[[ch, i, j]] = best;
                    positions[[ch, i, j]] = winner;
                }
            }
        }
        (pooled, positions)
    }

    /// Routes each output gradient to the input cell that won its window.
    pub fn backward_batch(
        &mut self,
        grad_outputs: &[Array3<f64>],
    ) -> NetworkResult<Vec<Array3<f64>>> {
        let winners = self
            .winners
            .take()
            .ok_or_else(|| NetworkError::MissingForwardCache {
                layer: "MaxPool".to_string(),
            })?;
        if winners.len() != grad_outputs.len() {
            return Err(NetworkError::BatchMismatch {
                expected: winners.len(),
                got: grad_outputs.len(),
            });
        }

        let mut input_grads = Vec::with_capacity(grad_outputs.len());
        for (grad, positions) in grad_outputs.iter().zip(&winners) {
            self.output_shape.check(grad)?;
            let mut input_grad = Array3::zeros(self.input_shape.dims());
            Zip::indexed(grad)
                .and(positions)
                .for_each(|(ch, _, _), &g, &(r, c)| {
                    input_grad[[ch, r, c]] += g;
                });
            input_grads.push(input_grad);
        }
        Ok(input_grads)
    }

    pub fn clear_cache(&mut self) {
        self.winners = None;
    }
}

//! Labeled grayscale image used for training and evaluation.

use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, NetworkResult};

/// A 2-D pixel matrix with values in `[0, 1]` and its class label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledImage {
    pixels: Array2<f64>,
    label: usize,
}

impl LabeledImage {
    pub fn new(pixels: Array2<f64>, label: usize) -> Self {
        Self { pixels, label }
    }

    /// Builds an image from a row-major pixel buffer.
    ///
    /// # Returns
    ///
    /// `NetworkError::InputShape` if `values.len() != rows * cols`.
    pub fn from_flat(rows: usize, cols: usize, values: Vec<f64>, label: usize) -> NetworkResult<Self> {
        let got = values.len();
        let pixels = Array2::from_shape_vec((rows, cols), values).map_err(|_| {
            NetworkError::InputShape {
                expected: rows * cols,
                got,
            }
        })?;
        Ok(Self { pixels, label })
    }

    pub fn pixels(&self) -> &Array2<f64> {
        &self.pixels
    }

    pub fn label(&self) -> usize {
        self.label
    }

    pub fn rows(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn cols(&self) -> usize {
        self.pixels.ncols()
    }

    /// Single-channel feature map `(1, rows, cols)` fed to the first layer.
    pub fn to_input(&self) -> Array3<f64> {
        self.pixels.clone().insert_axis(Axis(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flat_is_row_major() {
        let image = LabeledImage::from_flat(2, 3, vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5], 7).unwrap();
        assert_eq!(image.label(), 7);
        assert_eq!(image.pixels()[[1, 0]], 0.3);
        assert_eq!(image.to_input().dim(), (1, 2, 3));
        assert_eq!(image.to_input()[[0, 0, 2]], 0.2);
    }

    #[test]
    fn test_from_flat_rejects_wrong_length() {
        let err = LabeledImage::from_flat(2, 2, vec![0.0; 5], 0).unwrap_err();
        assert_eq!(err, NetworkError::InputShape { expected: 4, got: 5 });
    }
}

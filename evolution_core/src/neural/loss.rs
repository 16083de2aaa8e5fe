//! Softmax cross-entropy for classification.

use ndarray::Array1;

/// Lower bound applied to the true-class probability before taking the log.
pub const PROBABILITY_FLOOR: f64 = 1e-7;

/// Numerically stable softmax (the row maximum is subtracted first).
pub fn softmax(logits: &Array1<f64>) -> Array1<f64> {
    let max = logits.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Cross-entropy of `probabilities` against a one-hot `label`.
pub fn cross_entropy(probabilities: &Array1<f64>, label: usize) -> f64 {
    -probabilities[label].max(PROBABILITY_FLOOR).ln()
}

/// Gradient of softmax cross-entropy with respect to the logits:
/// `softmax - onehot(label)`.
pub fn softmax_cross_entropy_gradient(probabilities: &Array1<f64>, label: usize) -> Array1<f64> {
    let mut grad = probabilities.clone();
    grad[label] -= 1.0;
    grad
}

/// Index of the largest value; the first maximum wins.
pub fn argmax(values: &Array1<f64>) -> usize {
    let mut best = f64::NEG_INFINITY;
    let mut index = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > best {
            best = v;
            index = i;
        }
    }
    index
}

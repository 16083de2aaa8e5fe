//! Layer chain with softmax cross-entropy training and inference.

use std::fmt;

use ndarray::{Array1, Array3};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::layer::{Layer, Shape};
use super::loss::{argmax, cross_entropy, softmax, softmax_cross_entropy_gradient};
use crate::checkpoint::{check_version, CheckpointError, Checkpointable};
use crate::data::LabeledImage;
use crate::error::{NetworkError, NetworkResult};

const NETWORK_CHECKPOINT_VERSION: u32 = 1;

#[derive(Clone, Serialize, Deserialize)]
struct LayerConfigSnapshot {
    kind: String,
    input_shape: Shape,
    output_shape: Shape,
}

#[derive(Clone, Serialize, Deserialize)]
struct NetworkConfigSnapshot {
    layer_configs: Vec<LayerConfigSnapshot>,
    input_shape: Shape,
    class_count: usize,
}

impl NetworkConfigSnapshot {
    fn from_layers(layers: &[Layer], input_shape: Shape, class_count: usize) -> Self {
        let layer_configs = layers
            .iter()
            .map(|layer| LayerConfigSnapshot {
                kind: layer.kind().to_string(),
                input_shape: layer.input_shape(),
                output_shape: layer.output_shape(),
            })
            .collect();

        Self {
            layer_configs,
            input_shape,
            class_count,
        }
    }

    fn validate_layers(&self, layers: &[Layer]) -> Result<(), CheckpointError> {
        if self.layer_configs.len() != layers.len() {
            return Err(CheckpointError::InvalidFormat(format!(
                "Layer count mismatch: expected {}, found {}",
                self.layer_configs.len(),
                layers.len()
            )));
        }

        let mut shape = self.input_shape;
        for (expected, layer) in self.layer_configs.iter().zip(layers) {
            if expected.kind != layer.kind() {
                return Err(CheckpointError::InvalidFormat(format!(
                    "Layer kind mismatch: expected {}, found {}",
                    expected.kind,
                    layer.kind()
                )));
            }
            if layer.input_shape() != shape || expected.output_shape != layer.output_shape() {
                return Err(CheckpointError::InvalidFormat(format!(
                    "Layer shape mismatch at {}: expected {} -> {}, found {} -> {}",
                    layer.kind(),
                    shape,
                    expected.output_shape,
                    layer.input_shape(),
                    layer.output_shape()
                )));
            }
            shape = layer.output_shape();
        }

        if self.class_count == 0 || shape.elements() != self.class_count {
            return Err(CheckpointError::InvalidFormat(format!(
                "Network ends with {} outputs for {} classes",
                shape.elements(),
                self.class_count
            )));
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct NetworkCheckpoint {
    version: u32,
    layers: Vec<Layer>,
    config: NetworkConfigSnapshot,
}

/// Mean loss and sample count of one training epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub mean_loss: f64,
    pub samples: usize,
}

/// Correct predictions for one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassAccuracy {
    pub class: usize,
    pub correct: usize,
    pub total: usize,
}

impl ClassAccuracy {
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f32 / self.total as f32
        }
    }
}

/// A convolutional classifier: an ordered chain of layers ending in one
/// linear output per class.
///
/// Only [`NetworkBuilder`](super::NetworkBuilder) creates networks, so the
/// chain is always shape-consistent.
#[derive(Clone, Serialize, Deserialize)]
pub struct NeuralNetwork {
    layers: Vec<Layer>,
    input_shape: Shape,
    class_count: usize,
}

impl NeuralNetwork {
    pub(crate) fn from_parts(layers: Vec<Layer>, input_shape: Shape, class_count: usize) -> Self {
        Self {
            layers,
            input_shape,
            class_count,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Forward pass producing raw logits per sample.
    pub fn forward(&mut self, inputs: Vec<Array3<f64>>) -> NetworkResult<Vec<Array1<f64>>> {
        let mut activations = inputs;
        for layer in &mut self.layers {
            activations = layer.forward_batch(&activations)?;
        }
        Ok(activations
            .into_iter()
            .map(|out| out.into_iter().collect())
            .collect())
    }

    /// Forward pass for inference. Leaves no backward caches behind.
    pub fn predict(&mut self, inputs: Vec<Array3<f64>>) -> NetworkResult<Vec<Array1<f64>>> {
        let logits = self.forward(inputs);
        self.clear_caches();
        logits
    }

    pub fn clear_caches(&mut self) {
        for layer in &mut self.layers {
            layer.clear_cache();
        }
    }

    /// Backward pass from logit gradients through every layer in reverse.
    ///
    /// Parameters are updated along the way; the returned gradients are with
    /// respect to the network inputs.
    pub fn backward(&mut self, logit_grads: Vec<Array1<f64>>) -> NetworkResult<Vec<Array3<f64>>> {
        let classes = self.class_count;
        let mut grads = logit_grads
            .into_iter()
            .map(|g| {
                let got = g.len();
                g.into_shape((classes, 1, 1))
                    .map_err(|_| NetworkError::InputShape {
                        expected: classes,
                        got,
                    })
            })
            .collect::<NetworkResult<Vec<_>>>()?;

        for layer in self.layers.iter_mut().rev() {
            grads = layer.backward_batch(&grads)?;
        }
        Ok(grads)
    }

    fn check_label(&self, image: &LabeledImage) -> NetworkResult<()> {
        if image.label() < self.class_count {
            Ok(())
        } else {
            Err(NetworkError::LabelOutOfRange {
                label: image.label(),
                classes: self.class_count,
            })
        }
    }

    /// One gradient step on a single batch.
    ///
    /// # Returns
    ///
    /// Summed cross-entropy over the batch, measured before the update.
    pub fn train_batch(&mut self, batch: &[&LabeledImage]) -> NetworkResult<f64> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        for image in batch {
            self.check_label(image)?;
        }

        let inputs = batch.iter().map(|image| image.to_input()).collect();
        let logits = self.forward(inputs)?;

        let mut loss = 0.0;
        let mut grads = Vec::with_capacity(batch.len());
        for (image, logit) in batch.iter().zip(&logits) {
            let probabilities = softmax(logit);
            loss += cross_entropy(&probabilities, image.label());
            grads.push(softmax_cross_entropy_gradient(&probabilities, image.label()));
        }

        self.backward(grads)?;
        Ok(loss)
    }

    /// Trains one epoch over a shuffled view of `images`.
    ///
    /// # Arguments
    ///
    /// * `images` - Training set; left in its original order
    /// * `batch_size` - Samples per gradient step (the last batch may be short)
    /// * `rng` - Drives the shuffle
    pub fn train_epoch<R: Rng + ?Sized>(
        &mut self,
        images: &[LabeledImage],
        batch_size: usize,
        rng: &mut R,
    ) -> NetworkResult<EpochStats> {
        let mut order: Vec<&LabeledImage> = images.iter().collect();
        order.shuffle(rng);

        let mut total_loss = 0.0;
        for batch in order.chunks(batch_size.max(1)) {
            total_loss += self.train_batch(batch)?;
        }

        let samples = images.len();
        Ok(EpochStats {
            mean_loss: if samples == 0 {
                0.0
            } else {
                total_loss / samples as f64
            },
            samples,
        })
    }

    /// Fraction of images whose arg-max prediction matches the label.
    pub fn test(&mut self, images: &[LabeledImage]) -> NetworkResult<f32> {
        self.test_batch(images, 1)
    }

    /// Same as [`test`](Self::test), forwarding `batch_size` images at a time.
    pub fn test_batch(&mut self, images: &[LabeledImage], batch_size: usize) -> NetworkResult<f32> {
        if images.is_empty() {
            return Ok(0.0);
        }
        let mut correct = 0usize;
        for batch in images.chunks(batch_size.max(1)) {
            let logits = self.predict(batch.iter().map(LabeledImage::to_input).collect())?;
            correct += batch
                .iter()
                .zip(&logits)
                .filter(|(image, logit)| argmax(logit) == image.label())
                .count();
        }
        Ok(correct as f32 / images.len() as f32)
    }

    /// Predicted class of a single image.
    pub fn guess(&mut self, image: &LabeledImage) -> NetworkResult<usize> {
        let logits = self.predict(vec![image.to_input()])?;
        let logit = logits.first().ok_or(NetworkError::EmptyNetwork)?;
        Ok(argmax(&softmax(logit)))
    }

    /// Class probabilities for a row-major pixel buffer, e.g. a canvas drawn
    /// by hand.
    pub fn guess_probabilities(&mut self, pixels: &[f64]) -> NetworkResult<Vec<f64>> {
        let expected = self.input_shape.elements();
        if pixels.len() != expected {
            return Err(NetworkError::InputShape {
                expected,
                got: pixels.len(),
            });
        }
        let input = Array3::from_shape_vec(self.input_shape.dims(), pixels.to_vec()).map_err(
            |_| NetworkError::InputShape {
                expected,
                got: pixels.len(),
            },
        )?;
        let logits = self.predict(vec![input])?;
        let logit = logits.first().ok_or(NetworkError::EmptyNetwork)?;
        Ok(softmax(logit).to_vec())
    }

    /// Per-class breakdown of correct predictions.
    pub fn class_accuracy(&mut self, images: &[LabeledImage]) -> NetworkResult<Vec<ClassAccuracy>> {
        let mut stats: Vec<ClassAccuracy> = (0..self.class_count)
            .map(|class| ClassAccuracy {
                class,
                correct: 0,
                total: 0,
            })
            .collect();

        for image in images {
            self.check_label(image)?;
            let predicted = self.guess(image)?;
            let entry = &mut stats[image.label()];
            entry.total += 1;
            if predicted == image.label() {
                entry.correct += 1;
            }
        }
        Ok(stats)
    }
}

impl fmt::Display for NeuralNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "NeuralNetwork (input {}, {} classes)",
            self.input_shape, self.class_count
        )?;
        for (i, layer) in self.layers.iter().enumerate() {
            writeln!(
                f,
                "  {:>2}. {} -> {} ({} params)",
                i + 1,
                layer,
                layer.output_shape(),
                layer.parameter_count()
            )?;
        }
        write!(f, "Total parameters: {}", self.parameter_count())
    }
}

impl Checkpointable for NeuralNetwork {
    fn save_checkpoint<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let snapshot = NetworkCheckpoint {
            version: NETWORK_CHECKPOINT_VERSION,
            layers: self.layers.clone(),
            config: NetworkConfigSnapshot::from_layers(
                &self.layers,
                self.input_shape,
                self.class_count,
            ),
        };

        Self::write_snapshot(&snapshot, path)
    }

    fn load_checkpoint<P: AsRef<std::path::Path>>(path: P) -> Result<Self, CheckpointError> {
        let snapshot: NetworkCheckpoint = Self::read_snapshot(path)?;
        check_version(NETWORK_CHECKPOINT_VERSION, snapshot.version)?;
        snapshot.config.validate_layers(&snapshot.layers)?;

        Ok(Self {
            layers: snapshot.layers,
            input_shape: snapshot.config.input_shape,
            class_count: snapshot.config.class_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::{Activation, NetworkBuilder, SgdSettings};
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_network(seed: u64) -> NeuralNetwork {
        let mut rng = StdRng::seed_from_u64(seed);
        NetworkBuilder::new(6, 6, 3, SgdSettings::new(0.1, 0.0))
            .add_convolution(2, 3, 1, 1, Activation::LeakyReLU, &mut rng)
            .unwrap()
            .add_max_pool(2, 2)
            .unwrap()
            .add_output_layer(&mut rng)
            .unwrap()
            .build()
            .unwrap()
    }

    fn images() -> Vec<LabeledImage> {
        (0..6)
            .map(|i| {
                let pixels = Array2::from_shape_fn((6, 6), |(r, c)| ((r * 6 + c + i) % 5) as f64 / 4.0);
                LabeledImage::new(pixels, i % 3)
            })
            .collect()
    }

    #[test]
    fn test_backward_without_forward_is_error() {
        let mut net = small_network(1);
        let err = net.backward(vec![Array1::zeros(3)]).unwrap_err();
        assert!(matches!(err, NetworkError::MissingForwardCache { .. }));
    }

    #[test]
    fn test_evaluation_leaves_no_backward_caches() {
        let mut net = small_network(1);
        let data = images();
        net.test_batch(&data, 3).unwrap();
        let err = net.backward(vec![Array1::zeros(3); 3]).unwrap_err();
        assert!(matches!(err, NetworkError::MissingForwardCache { .. }));

        net.guess(&data[0]).unwrap();
        let err = net.backward(vec![Array1::zeros(3)]).unwrap_err();
        assert!(matches!(err, NetworkError::MissingForwardCache { .. }));
    }

    #[test]
    fn test_train_epoch_reduces_loss() {
        let mut net = small_network(2);
        let data = images();
        let mut rng = StdRng::seed_from_u64(0);

        let first = net.train_epoch(&data, 2, &mut rng).unwrap();
        let mut last = first;
        for _ in 0..30 {
            last = net.train_epoch(&data, 2, &mut rng).unwrap();
        }
        assert_eq!(first.samples, 6);
        assert!(last.mean_loss < first.mean_loss);
    }

    #[test]
    fn test_test_on_empty_set_is_zero() {
        let mut net = small_network(3);
        assert_eq!(net.test(&[]).unwrap(), 0.0);
    }

    #[test]
    fn test_test_batch_agrees_with_test() {
        let mut net = small_network(4);
        let data = images();
        let single = net.test(&data).unwrap();
        assert_eq!(net.test_batch(&data, 4).unwrap(), single);
    }

    #[test]
    fn test_label_out_of_range() {
        let mut net = small_network(5);
        let image = LabeledImage::new(Array2::zeros((6, 6)), 7);
        assert_eq!(
            net.train_batch(&[&image]).unwrap_err(),
            NetworkError::LabelOutOfRange {
                label: 7,
                classes: 3
            }
        );
    }

    #[test]
    fn test_guess_probabilities() {
        let mut net = small_network(6);
        let probs = net.guess_probabilities(&[0.5; 36]).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);

        let err = net.guess_probabilities(&[0.5; 35]).unwrap_err();
        assert_eq!(err, NetworkError::InputShape { expected: 36, got: 35 });
    }

    #[test]
    fn test_class_accuracy_totals() {
        let mut net = small_network(7);
        let data = images();
        let stats = net.class_accuracy(&data).unwrap();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.iter().map(|s| s.total).sum::<usize>(), 6);

        let correct: usize = stats.iter().map(|s| s.correct).sum();
        let overall = net.test(&data).unwrap();
        assert!((overall - correct as f32 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_display_lists_layers() {
        let net = small_network(8);
        let summary = net.to_string();
        assert!(summary.contains("Convolution 2 filters 3x3"));
        assert!(summary.contains("MaxPool 2x2 stride 2"));
        assert!(summary.ends_with(&format!("Total parameters: {}", net.parameter_count())));
    }

    #[test]
    fn test_checkpoint_roundtrip_preserves_predictions() {
        use std::fs;

        let mut net = small_network(9);
        let data = images();
        let mut rng = StdRng::seed_from_u64(1);
        net.train_epoch(&data, 3, &mut rng).unwrap();

        let mut path = std::env::temp_dir();
        path.push(format!("cnn_network_checkpoint_{}.bin", uuid::Uuid::new_v4()));

        net.save_checkpoint(&path).expect("save checkpoint");
        let mut restored = NeuralNetwork::load_checkpoint(&path).expect("load checkpoint");
        fs::remove_file(&path).ok();

        assert_eq!(restored.parameter_count(), net.parameter_count());
        let pixels: Vec<f64> = data[0].pixels().iter().copied().collect();
        assert_eq!(
            restored.guess_probabilities(&pixels).unwrap(),
            net.guess_probabilities(&pixels).unwrap()
        );
    }

    #[test]
    fn test_config_validation_detects_mismatch() {
        let net = small_network(10);
        let mut config =
            NetworkConfigSnapshot::from_layers(net.layers(), net.input_shape(), net.class_count());
        config.layer_configs[1].kind = "Convolution".to_string();

        let err = config.validate_layers(net.layers()).expect_err("mismatch");
        match err {
            CheckpointError::InvalidFormat(msg) => assert!(msg.contains("Layer kind mismatch")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

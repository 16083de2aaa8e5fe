//! Fluent construction of a [`NeuralNetwork`] layer chain.

use rand::Rng;

use super::activation::Activation;
use super::convolution::ConvolutionLayer;
use super::dense::FullyConnectedLayer;
use super::layer::{Layer, Shape};
use super::network::NeuralNetwork;
use super::optimizer::SgdSettings;
use super::pooling::MaxPoolLayer;
use crate::config::NetworkConfig;
use crate::error::{NetworkError, NetworkResult};

/// Appends layers one at a time, inferring each input shape from the
/// previous layer's output.
///
/// Every `add_*` step validates that the new layer fits and fails with
/// `NetworkError::InvalidArchitecture` otherwise.
///
/// # Examples
///
/// ```
/// use cnn_evolution_core::neural::{Activation, NetworkBuilder, SgdSettings};
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(1);
/// let network = NetworkBuilder::new(28, 28, 10, SgdSettings::default())
///     .add_convolution(4, 3, 1, 0, Activation::ReLU, &mut rng)?
///     .add_max_pool(2, 2)?
///     .add_output_layer(&mut rng)?
///     .build()?;
/// assert_eq!(network.layers().len(), 3);
/// # Ok::<(), cnn_evolution_core::NetworkError>(())
/// ```
#[derive(Clone)]
pub struct NetworkBuilder {
    input_shape: Shape,
    class_count: usize,
    sgd: SgdSettings,
    layers: Vec<Layer>,
}

impl NetworkBuilder {
    pub fn new(input_rows: usize, input_cols: usize, class_count: usize, sgd: SgdSettings) -> Self {
        Self {
            input_shape: Shape::new(1, input_rows, input_cols),
            class_count,
            sgd,
            layers: Vec::new(),
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(
            config.input_rows,
            config.input_cols,
            config.output_classes,
            SgdSettings::new(config.learning_rate, config.l2_lambda),
        )
    }

    /// Output shape of the last layer so far, or the image shape.
    pub fn current_shape(&self) -> Shape {
        self.layers
            .last()
            .map(Layer::output_shape)
            .unwrap_or(self.input_shape)
    }

    fn position(&self) -> usize {
        self.layers.len() + 1
    }

    pub fn add_convolution<R: Rng + ?Sized>(
        mut self,
        filters: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        activation: Activation,
        rng: &mut R,
    ) -> NetworkResult<Self> {
        let layer = ConvolutionLayer::new(
            self.current_shape(),
            filters,
            kernel_size,
            stride,
            padding,
            activation,
            self.sgd,
            rng,
        )
        .map_err(|e| self.locate(e))?;
        self.layers.push(Layer::Convolution(layer));
        Ok(self)
    }

    pub fn add_max_pool(mut self, window: usize, stride: usize) -> NetworkResult<Self> {
        let layer =
            MaxPoolLayer::new(self.current_shape(), window, stride).map_err(|e| self.locate(e))?;
        self.layers.push(Layer::MaxPool(layer));
        Ok(self)
    }

    pub fn add_fully_connected<R: Rng + ?Sized>(
        mut self,
        outputs: usize,
        activation: Activation,
        rng: &mut R,
    ) -> NetworkResult<Self> {
        let layer =
            FullyConnectedLayer::new(self.current_shape(), outputs, activation, self.sgd, rng)
                .map_err(|e| self.locate(e))?;
        self.layers.push(Layer::FullyConnected(layer));
        Ok(self)
    }

    /// Terminal classification layer: `class_count` linear outputs.
    pub fn add_output_layer<R: Rng + ?Sized>(self, rng: &mut R) -> NetworkResult<Self> {
        let classes = self.class_count;
        self.add_fully_connected(classes, Activation::Linear, rng)
    }

    /// Finishes the chain.
    ///
    /// Fails with `NetworkError::EmptyNetwork` for an empty chain and with
    /// `NetworkError::InvalidArchitecture` when the last layer does not
    /// produce one value per class.
    pub fn build(self) -> NetworkResult<NeuralNetwork> {
        let last = self.layers.last().ok_or(NetworkError::EmptyNetwork)?;
        let produced = last.output_shape().elements();
        if produced != self.class_count {
            return Err(NetworkError::invalid(
                format!("{} #{}", last.kind(), self.layers.len()),
                format!(
                    "network ends with {produced} outputs but {} classes are expected",
                    self.class_count
                ),
            ));
        }
        Ok(NeuralNetwork::from_parts(
            self.layers,
            self.input_shape,
            self.class_count,
        ))
    }

    /// Prefix the failing layer's kind with its position in the chain.
    fn locate(&self, err: NetworkError) -> NetworkError {
        match err {
            NetworkError::InvalidArchitecture { layer, reason } => NetworkError::InvalidArchitecture {
                layer: format!("{layer} #{}", self.position()),
                reason,
            },
            other => other,
        }
    }
}

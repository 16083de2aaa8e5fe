//! Convolutional network engine.
//!
//! Layers exchange batches of `(channels, rows, cols)` feature maps
//! (`ndarray::Array3<f64>`). Forward passes cache what the matching backward
//! pass needs; backward passes update parameters in place and return the
//! gradient for the preceding layer.

pub mod activation;
pub mod builder;
pub mod convolution;
pub mod dense;
pub mod init;
pub mod layer;
pub mod loss;
pub mod network;
pub mod optimizer;
pub mod pooling;

pub use activation::{Activation, InitScheme, LEAK};
pub use builder::NetworkBuilder;
pub use convolution::ConvolutionLayer;
pub use dense::FullyConnectedLayer;
pub use init::WeightInit;
pub use layer::{Layer, Shape};
pub use loss::{argmax, cross_entropy, softmax, softmax_cross_entropy_gradient};
pub use network::{ClassAccuracy, EpochStats, NeuralNetwork};
pub use optimizer::SgdSettings;
pub use pooling::MaxPoolLayer;

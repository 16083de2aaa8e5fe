//! # CNN Evolution Core
//!
//! A hand-built convolutional network engine with batched forward and
//! backward passes, plus a genetic algorithm that searches over network
//! topologies by training and scoring every candidate.
//!
//! ## Quick Start
//!
//! ```rust
//! use cnn_evolution_core::data::{generate_pattern_dataset, PatternDatasetConfig};
//! use cnn_evolution_core::genetics::{build_network, Chromosome};
//! use cnn_evolution_core::EngineConfig;
//! use rand::SeedableRng;
//!
//! let mut config = EngineConfig::default();
//! config.network.input_rows = 12;
//! config.network.input_cols = 12;
//! config.network.output_classes = 6;
//!
//! let images = generate_pattern_dataset(&PatternDatasetConfig {
//!     size: 12,
//!     samples_per_class: 2,
//!     ..Default::default()
//! });
//!
//! let chromosome: Chromosome =
//!     "CONVOLUTION (4 filters 3x3, stride=1, same padding + ReLU) → MAX_POOL (2x2, stride=2) → FC output"
//!         .parse()?;
//! let mut rng = rand::rngs::StdRng::seed_from_u64(1);
//! let mut network = build_network(&chromosome, &config.network, &mut rng)?;
//! network.train_epoch(&images, 4, &mut rng)?;
//! let accuracy = network.test(&images)?;
//! assert!((0.0..=1.0).contains(&accuracy));
//! # Ok::<(), cnn_evolution_core::NetworkError>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`neural`] - Layers, network, loss and SGD updates
//! - [`genetics`] - Chromosomes, genetic operators and the search loop
//! - [`training`] - Multi-epoch training with validation
//! - [`config`] - Engine configuration via TOML
//! - [`checkpoint`] - Versioned binary snapshots
//! - [`logging`] - JSON line-delimited run journal

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod genetics;
pub mod logging;
pub mod neural;
pub mod training;

pub use checkpoint::{CheckpointError, Checkpointable};
pub use config::{
    ConfigError, EngineConfig, EvolutionConfig, NetworkConfig, SearchSpace, TrainingConfig,
};
pub use data::{LabeledImage, PatternDatasetConfig};
pub use error::{NetworkError, NetworkResult};
pub use genetics::{Chromosome, FitnessCache, GeneticAlgorithm, Individual, LayerGene};
pub use logging::{
    init_tracing, GenerationRecord, JsonlResultsLog, MemoryResultsLog, ResultsSink,
};
pub use neural::{Activation, NetworkBuilder, NeuralNetwork};
pub use training::{EpochMetrics, EpochTrainer, TrainingReport};

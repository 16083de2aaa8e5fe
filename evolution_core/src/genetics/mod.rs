//! Genetic search over network topologies.
//!
//! A [`Chromosome`] is an ordered list of [`LayerGene`]s that prints to and
//! parses from the architecture language:
//!
//! ```text
//! CONVOLUTION (8 filters 3x3, stride=1, same padding + ReLU) → MAX_POOL (2x2, stride=2) → FC(128,ReLU) → FC output
//! ```
//!
//! [`GeneticAlgorithm`] trains every candidate with the configured schedule
//! and keeps the lowest fitness (classification error plus a size penalty).

pub mod algorithm;
pub mod cache;
pub mod chromosome;
pub mod gene;
pub mod operators;

pub use algorithm::{
    evaluate_chromosome, fitness, GenerationSummary, GeneticAlgorithm, Individual,
    PopulationQuotas, UNEVALUATED,
};
pub use cache::{CacheEntry, Evaluation, FitnessCache};
pub use chromosome::{Chromosome, GENE_SEPARATOR};
pub use gene::{LayerGene, Padding};
pub use operators::{build_network, crossover, mutate};

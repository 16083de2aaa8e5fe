//! Genetic operators: decode a chromosome into a network, recombine, mutate.

use rand::Rng;

use super::chromosome::{random_convolution, random_pool, Chromosome};
use super::gene::LayerGene;
use crate::config::{NetworkConfig, SearchSpace};
use crate::error::NetworkResult;
use crate::neural::{NetworkBuilder, NeuralNetwork};

/// Builds a freshly initialized network for `chromosome`.
///
/// Fails with `NetworkError::InvalidArchitecture` when a gene does not fit
/// the feature map left by the genes before it.
///
/// # Examples
///
/// ```
/// use cnn_evolution_core::config::NetworkConfig;
/// use cnn_evolution_core::genetics::{build_network, Chromosome};
/// use rand::SeedableRng;
///
/// let chromosome: Chromosome =
///     "CONVOLUTION (4 filters 3x3, stride=1, valid padding + ReLU) → MAX_POOL (2x2, stride=2) → FC output"
///         .parse()?;
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let network = build_network(&chromosome, &NetworkConfig::default(), &mut rng)?;
/// assert_eq!(network.parameter_count(), 4 * 9 + 4 + 4 * 13 * 13 * 10);
/// # Ok::<(), cnn_evolution_core::NetworkError>(())
/// ```
pub fn build_network<R: Rng + ?Sized>(
    chromosome: &Chromosome,
    config: &NetworkConfig,
    rng: &mut R,
) -> NetworkResult<NeuralNetwork> {
    let mut builder = NetworkBuilder::from_config(config);
    for gene in chromosome.genes() {
        builder = match *gene {
            LayerGene::Convolution {
                filters,
                kernel_size,
                stride,
                padding,
                activation,
            } => builder.add_convolution(
                filters,
                kernel_size,
                stride,
                padding.amount(kernel_size),
                activation,
                rng,
            )?,
            LayerGene::MaxPool { window, stride } => builder.add_max_pool(window, stride)?,
            LayerGene::FullyConnected {
                hidden: Some(size),
                activation,
            } => builder.add_fully_connected(size, activation, rng)?,
            LayerGene::FullyConnected { hidden: None, .. } => builder.add_output_layer(rng)?,
        };
    }
    builder.build()
}

/// Single-point crossover of the hidden genes.
///
/// The child takes `a`'s genes before a random cut and `b`'s genes from the
/// cut on. An empty child keeps `a`'s first gene.
pub fn crossover<R: Rng + ?Sized>(a: &Chromosome, b: &Chromosome, rng: &mut R) -> Chromosome {
    let (left, right) = (a.hidden_genes(), b.hidden_genes());
    let cut = rng.gen_range(0..=left.len().min(right.len()));

    let mut child: Vec<LayerGene> = left[..cut].to_vec();
    child.extend_from_slice(&right[cut..]);
    if child.is_empty() {
        if let Some(first) = left.first() {
            child.push(first.clone());
        }
    }
    Chromosome::from_hidden(child)
}

/// Applies exactly one structural mutation.
///
/// | roll        | mutation                                        |
/// |-------------|-------------------------------------------------|
/// | `[0, 0.4)`  | redraw one convolution gene                      |
/// | `[0.4, 0.7)`| insert a new convolution gene                    |
/// | `[0.7, 0.9)`| toggle the pooling gene after a convolution gene |
/// | `[0.9, 1)`  | delete one hidden gene                           |
///
/// A mutation with nothing to act on returns the chromosome unchanged.
pub fn mutate<R: Rng + ?Sized>(
    chromosome: &Chromosome,
    space: &SearchSpace,
    rng: &mut R,
) -> Chromosome {
    let mut genes = chromosome.hidden_genes().to_vec();
    let roll: f64 = rng.gen();

    if roll < 0.4 {
        replace_convolution(&mut genes, space, rng);
    } else if roll < 0.7 {
        let position = rng.gen_range(0..=genes.len());
        let floor = filters_before(&genes, position);
        genes.insert(position, random_convolution(space, floor, rng));
    } else if roll < 0.9 {
        toggle_pool(&mut genes, space, rng);
    } else if genes.len() >= 3 {
        let position = rng.gen_range(0..genes.len());
        genes.remove(position);
    }

    Chromosome::from_hidden(genes)
}

/// Filter count of the last convolution gene before `position`, or 0.
fn filters_before(genes: &[LayerGene], position: usize) -> usize {
    genes[..position]
        .iter()
        .rev()
        .find_map(|gene| match gene {
            LayerGene::Convolution { filters, .. } => Some(*filters),
            _ => None,
        })
        .unwrap_or(0)
}

fn convolution_positions(genes: &[LayerGene]) -> Vec<usize> {
    genes
        .iter()
        .enumerate()
        .filter(|(_, gene)| gene.is_convolution())
        .map(|(i, _)| i)
        .collect()
}

fn replace_convolution<R: Rng + ?Sized>(
    genes: &mut [LayerGene],
    space: &SearchSpace,
    rng: &mut R,
) {
    let positions = convolution_positions(genes);
    if positions.is_empty() {
        return;
    }
    let position = positions[rng.gen_range(0..positions.len())];
    let floor = filters_before(genes, position);

    genes[position] = random_convolution(space, floor, rng);
}

fn toggle_pool<R: Rng + ?Sized>(genes: &mut Vec<LayerGene>, space: &SearchSpace, rng: &mut R) {
    let positions = convolution_positions(genes);
    if positions.is_empty() {
        return;
    }
    let after = positions[rng.gen_range(0..positions.len())] + 1;
    if genes.get(after).is_some_and(LayerGene::is_pool) {
        genes.remove(after);
    } else {
        genes.insert(after, random_pool(space, rng));
    }
}

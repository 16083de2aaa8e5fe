//! Ordered layer genes describing one candidate architecture.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::gene::{LayerGene, Padding};
use crate::config::SearchSpace;
use crate::error::NetworkError;
use crate::neural::Activation;

/// Separator between genes in an architecture string.
pub const GENE_SEPARATOR: &str = " → ";

/// A network topology: hidden genes followed by exactly one output gene.
///
/// Equality and hashing go through the architecture string, so two
/// chromosomes are the same candidate exactly when they print the same.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Chromosome {
    genes: Vec<LayerGene>,
}

impl Chromosome {
    /// Wraps `hidden` and appends the terminal output gene.
    ///
    /// Output genes inside `hidden` are dropped.
    pub fn from_hidden(hidden: Vec<LayerGene>) -> Self {
        let mut genes: Vec<LayerGene> = hidden.into_iter().filter(|g| !g.is_output()).collect();
        genes.push(LayerGene::output());
        Self { genes }
    }

    /// Draws a random architecture for `rows x cols` images.
    ///
    /// Convolution blocks keep filter counts non-decreasing and are skipped
    /// when they would shrink the feature map below
    /// `space.min_conv_output`. A pooling gene may follow each block while
    /// the map is at least `space.min_pool_input` wide.
    pub fn random<R: Rng + ?Sized>(
        space: &SearchSpace,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> Self {
        let mut genes = Vec::new();
        let mut size = (rows, cols);
        let mut min_filters = 0;
        let mut pools = 0;

        let min_blocks = space.min_conv_blocks.min(space.max_conv_blocks);
        let blocks = rng.gen_range(min_blocks..=space.max_conv_blocks);
        for _ in 0..blocks {
            let conv = random_convolution(space, min_filters, rng);
            match conv.output_size(size) {
                Some(next) if next.0.min(next.1) >= space.min_conv_output => {
                    if let LayerGene::Convolution { filters, .. } = conv {
                        min_filters = filters;
                    }
                    genes.push(conv);
                    size = next;
                }
                _ => continue,
            }

            if size.0.min(size.1) >= space.min_pool_input
                && pools < space.max_pool_layers
                && rng.gen_bool(0.5)
            {
                let pool = random_pool(space, rng);
                if let Some(next) = pool.output_size(size) {
                    genes.push(pool);
                    size = next;
                    pools += 1;
                }
            }
        }

        let hidden_fc = rng.gen_range(0..space.max_fc_layers.max(1));
        for _ in 0..hidden_fc {
            genes.push(random_fully_connected(space, rng));
        }

        Self::from_hidden(genes)
    }

    /// All genes, output gene last.
    pub fn genes(&self) -> &[LayerGene] {
        &self.genes
    }

    /// Genes without the terminal output gene.
    pub fn hidden_genes(&self) -> &[LayerGene] {
        &self.genes[..self.genes.len().saturating_sub(1)]
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn convolution_count(&self) -> usize {
        self.genes.iter().filter(|g| g.is_convolution()).count()
    }

    /// Canonical architecture string, used as the fitness cache key.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, gene) in self.genes.iter().enumerate() {
            if i > 0 {
                f.write_str(GENE_SEPARATOR)?;
            }
            write!(f, "{gene}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Chromosome {
    type Error = NetworkError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<Chromosome> for String {
    fn from(chromosome: Chromosome) -> Self {
        chromosome.to_string()
    }
}

impl FromStr for Chromosome {
    type Err = NetworkError;

    /// Parses genes joined by `→`. The string must end with `FC output` and
    /// contain it nowhere else.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let genes = s
            .split('→')
            .map(str::parse::<LayerGene>)
            .collect::<Result<Vec<_>, _>>()?;

        match genes.iter().position(LayerGene::is_output) {
            Some(index) if index + 1 == genes.len() => Ok(Self { genes }),
            _ => Err(NetworkError::MalformedArchitecture(s.trim().to_string())),
        }
    }
}

impl PartialEq for Chromosome {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Chromosome {}

impl Hash for Chromosome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

fn pick<T: Copy, R: Rng + ?Sized>(values: &[T], fallback: T, rng: &mut R) -> T {
    values.choose(rng).copied().unwrap_or(fallback)
}

/// Filter count no smaller than `at_least`, uniform over the eligible
/// entries. Falls back to the largest entry when none is big enough.
pub(crate) fn pick_filters<R: Rng + ?Sized>(
    filters: &[usize],
    at_least: usize,
    rng: &mut R,
) -> usize {
    if filters.is_empty() {
        return at_least.max(1);
    }
    let start = filters
        .iter()
        .position(|&f| f >= at_least)
        .unwrap_or(filters.len() - 1);
    filters[rng.gen_range(start..filters.len())]
}

pub(crate) fn random_convolution<R: Rng + ?Sized>(
    space: &SearchSpace,
    min_filters: usize,
    rng: &mut R,
) -> LayerGene {
    let filters = pick_filters(&space.filters, min_filters, rng);
    let kernel_size = pick(&space.kernel_sizes, 3, rng);
    let activation = pick(&space.activations, Activation::ReLU, rng);
    let padding = if rng.gen_bool(0.5) {
        Padding::Same
    } else {
        Padding::Valid
    };
    let stride = pick(&space.conv_strides, 1, rng);

    LayerGene::Convolution {
        filters,
        kernel_size,
        stride,
        padding,
        activation,
    }
}

pub(crate) fn random_pool<R: Rng + ?Sized>(space: &SearchSpace, rng: &mut R) -> LayerGene {
    LayerGene::MaxPool {
        window: pick(&space.pool_windows, 2, rng),
        stride: pick(&space.pool_strides, 2, rng),
    }
}

pub(crate) fn random_fully_connected<R: Rng + ?Sized>(
    space: &SearchSpace,
    rng: &mut R,
) -> LayerGene {
    LayerGene::FullyConnected {
        hidden: Some(pick(&space.fc_sizes, 128, rng)),
        activation: pick(&space.activations, Activation::ReLU, rng),
    }
}

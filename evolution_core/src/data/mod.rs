//! Labeled image datasets: generation, shuffling and splitting.

pub mod image;
pub mod pattern;

use rand::seq::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub use image::LabeledImage;
pub use pattern::{generate_pattern_dataset, PatternClass, PatternDatasetConfig};

/// Splits off the leading `validation_fraction` of `images` as a validation set.
///
/// # Returns
///
/// Tuple of (training set, validation set)
pub fn split_validation(
    images: &[LabeledImage],
    validation_fraction: f64,
) -> (Vec<LabeledImage>, Vec<LabeledImage>) {
    let fraction = validation_fraction.clamp(0.0, 1.0);
    let validation_size = (images.len() as f64 * fraction) as usize;
    let (validation, train) = images.split_at(validation_size);
    (train.to_vec(), validation.to_vec())
}

/// Shuffles a dataset in place.
///
/// # Arguments
///
/// * `images` - Dataset to shuffle
/// * `seed` - Random seed
pub fn shuffle(images: &mut [LabeledImage], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    images.shuffle(&mut rng);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(n: usize) -> Vec<LabeledImage> {
        (0..n)
            .map(|i| LabeledImage::new(ndarray::Array2::zeros((2, 2)), i))
            .collect()
    }

    #[test]
    fn test_split_validation_takes_leading_tenth() {
        let (train, validation) = split_validation(&images(30), 0.1);
        assert_eq!(validation.len(), 3);
        assert_eq!(train.len(), 27);
        assert_eq!(validation[0].label(), 0);
        assert_eq!(train[0].label(), 3);
    }

    #[test]
    fn test_shuffle_is_seeded_permutation() {
        let mut a = images(20);
        let mut b = images(20);
        shuffle(&mut a, 4);
        shuffle(&mut b, 4);
        assert_eq!(a, b);

        let mut labels: Vec<usize> = a.iter().map(|i| i.label()).collect();
        labels.sort_unstable();
        assert_eq!(labels, (0..20).collect::<Vec<_>>());
    }
}

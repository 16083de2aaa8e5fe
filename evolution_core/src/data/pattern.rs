//! Synthetic stroke patterns for demos, tests and benchmarks.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::image::LabeledImage;

/// Shape drawn into a pattern image; the discriminant is the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternClass {
    HorizontalBar = 0,
    VerticalBar = 1,
    Diagonal = 2,
    AntiDiagonal = 3,
    Cross = 4,
    Frame = 5,
}

impl PatternClass {
    pub fn all() -> [PatternClass; 6] {
        [
            PatternClass::HorizontalBar,
            PatternClass::VerticalBar,
            PatternClass::Diagonal,
            PatternClass::AntiDiagonal,
            PatternClass::Cross,
            PatternClass::Frame,
        ]
    }

    pub fn num_classes() -> usize {
        Self::all().len()
    }

    pub fn label(self) -> usize {
        self as usize
    }

    /// Whether pixel `(r, c)` is on the stroke, for a stroke centred at
    /// `offset` in an `n x n` canvas.
    fn covers(self, r: usize, c: usize, n: usize, offset: isize) -> bool {
        let (r, c, n) = (r as isize, c as isize, n as isize);
        let centre = n / 2 + offset;
        match self {
            PatternClass::HorizontalBar => (r - centre).abs() <= 1,
            PatternClass::VerticalBar => (c - centre).abs() <= 1,
            PatternClass::Diagonal => (r - c - offset).abs() <= 1,
            PatternClass::AntiDiagonal => (r + c - (n - 1) - offset).abs() <= 1,
            PatternClass::Cross => (r - centre).abs() <= 1 || (c - centre).abs() <= 1,
            PatternClass::Frame => {
                let inset = 2 + offset.abs();
                let on_row = r == inset || r == n - 1 - inset;
                let on_col = c == inset || c == n - 1 - inset;
                let inside = r >= inset && r <= n - 1 - inset && c >= inset && c <= n - 1 - inset;
                inside && (on_row || on_col)
            }
        }
    }
}

/// Parameters for [`generate_pattern_dataset`].
#[derive(Debug, Clone)]
pub struct PatternDatasetConfig {
    /// Side length of the square images
    pub size: usize,
    /// Number of samples per pattern class
    pub samples_per_class: usize,
    /// Half-width of the uniform pixel noise
    pub noise_level: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for PatternDatasetConfig {
    fn default() -> Self {
        Self {
            size: 28,
            samples_per_class: 20,
            noise_level: 0.1,
            seed: 42,
        }
    }
}

/// Generates a dataset of stroke patterns, grouped by class.
///
/// Each sample shifts its stroke by up to two pixels and adds uniform noise;
/// pixel values are clamped to `[0, 1]`.
///
/// # Examples
///
/// ```
/// use cnn_evolution_core::data::{generate_pattern_dataset, PatternDatasetConfig};
///
/// let config = PatternDatasetConfig { samples_per_class: 3, ..Default::default() };
/// let dataset = generate_pattern_dataset(&config);
/// assert_eq!(dataset.len(), 18); // 3 per class × 6 classes
/// ```
pub fn generate_pattern_dataset(config: &PatternDatasetConfig) -> Vec<LabeledImage> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let n = config.size;
    let mut dataset = Vec::with_capacity(config.samples_per_class * PatternClass::num_classes());

    for class in PatternClass::all() {
        for _ in 0..config.samples_per_class {
            let offset = rng.gen_range(-2isize..=2);
            let intensity = 0.7 + rng.gen::<f64>() * 0.3;
            let pixels = Array2::from_shape_fn((n, n), |(r, c)| {
                let base = if class.covers(r, c, n, offset) {
                    intensity
                } else {
                    0.0
                };
                let noise = (rng.gen::<f64>() * 2.0 - 1.0) * config.noise_level;
                (base + noise).clamp(0.0, 1.0)
            });
            dataset.push(LabeledImage::new(pixels, class.label()));
        }
    }

    dataset
}

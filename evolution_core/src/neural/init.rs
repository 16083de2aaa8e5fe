//! Weight initialization keyed on the layer activation.

use rand::Rng;
use rand_distr::StandardNormal;

use super::activation::{Activation, InitScheme};

/// Sampler for the initial weights of one layer.
#[derive(Debug, Clone, Copy)]
pub struct WeightInit {
    scheme: InitScheme,
    fan_in: usize,
    fan_out: usize,
}

impl WeightInit {
    /// Picks He or Xavier from the activation's preference.
    ///
    /// # Arguments
    ///
    /// * `activation` - Activation applied after the layer
    /// * `fan_in` - Inputs feeding one output unit
    /// * `fan_out` - Outputs fed by one input unit
    pub fn for_activation(activation: Activation, fan_in: usize, fan_out: usize) -> Self {
        Self {
            scheme: activation.init_scheme(),
            fan_in: fan_in.max(1),
            fan_out: fan_out.max(1),
        }
    }

    pub fn scheme(&self) -> InitScheme {
        self.scheme
    }

    /// Standard deviation (He) or half-width (Xavier) of the distribution.
    pub fn scale(&self) -> f64 {
        match self.scheme {
            InitScheme::He => (2.0 / self.fan_in as f64).sqrt(),
            InitScheme::Xavier => (6.0 / (self.fan_in + self.fan_out) as f64).sqrt(),
        }
    }

    /// Draw one weight.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let scale = self.scale();
        match self.scheme {
            InitScheme::He => {
                let z: f64 = rng.sample(StandardNormal);
                z * scale
            }
            InitScheme::Xavier => rng.gen_range(-scale..=scale),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_xavier_stays_within_limit() {
        let init = WeightInit::for_activation(Activation::Sigmoid, 25, 100);
        assert_eq!(init.scheme(), InitScheme::Xavier);

        let limit = (6.0f64 / 125.0).sqrt();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let w = init.sample(&mut rng);
            assert!(w.abs() <= limit);
        }
    }

    #[test]
    fn test_he_matches_expected_spread() {
        let init = WeightInit::for_activation(Activation::ReLU, 50, 10);
        let mut rng = StdRng::seed_from_u64(11);

        let samples: Vec<f64> = (0..20_000).map(|_| init.sample(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|w| (w - mean).powi(2)).sum::<f64>() / samples.len() as f64;

        assert!(mean.abs() < 0.01);
        assert!((var.sqrt() - 0.2).abs() < 0.01);
    }
}

//! Scalar activation functions and their weight-initialization preference.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Negative-side slope of [`Activation::LeakyReLU`].
pub const LEAK: f64 = 0.01;

/// Weight initialization heuristic preferred by an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitScheme {
    /// Zero-mean Gaussian, std = sqrt(2 / fan_in)
    He,
    /// Uniform in ±sqrt(6 / (fan_in + fan_out))
    Xavier,
}

/// Element-wise activation applied after a layer's affine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    LeakyReLU,
    Sigmoid,
    Linear,
}

impl Activation {
    /// All variants, in the order used by architecture strings.
    pub const ALL: [Activation; 4] = [
        Activation::ReLU,
        Activation::LeakyReLU,
        Activation::Sigmoid,
        Activation::Linear,
    ];

    /// Activation value at pre-activation `z`.
    pub fn forward(self, z: f64) -> f64 {
        match self {
            Activation::ReLU => z.max(0.0),
            Activation::LeakyReLU => {
                if z <= 0.0 {
                    LEAK * z
                } else {
                    z
                }
            }
            Activation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
            Activation::Linear => z,
        }
    }

    /// Derivative of the activation at pre-activation `z`.
    pub fn backward(self, z: f64) -> f64 {
        match self {
            Activation::ReLU => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU => {
                if z > 0.0 {
                    1.0
                } else {
                    LEAK
                }
            }
            Activation::Sigmoid => {
                let s = self.forward(z);
                s * (1.0 - s)
            }
            Activation::Linear => 1.0,
        }
    }

    pub fn init_scheme(self) -> InitScheme {
        match self {
            Activation::Sigmoid => InitScheme::Xavier,
            Activation::ReLU | Activation::LeakyReLU | Activation::Linear => InitScheme::He,
        }
    }

    /// Canonical name as written in architecture strings.
    pub fn name(self) -> &'static str {
        match self {
            Activation::ReLU => "ReLU",
            Activation::LeakyReLU => "LeakyReLU",
            Activation::Sigmoid => "Sigmoid",
            Activation::Linear => "Linear",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = NetworkError;

    /// Case-insensitive lookup against [`Activation::ALL`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Activation::ALL
            .into_iter()
            .find(|activation| activation.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| NetworkError::UnknownActivation(name.to_string()))
    }
}

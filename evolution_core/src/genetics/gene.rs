//! One layer descriptor and its architecture-string token.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, NetworkResult};
use crate::neural::Activation;

/// Zero border of a convolution gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Padding {
    /// `kernel / 2` zeros on every side
    Same,
    /// No padding
    Valid,
}

impl Padding {
    pub fn amount(self, kernel_size: usize) -> usize {
        match self {
            Padding::Same => kernel_size / 2,
            Padding::Valid => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Padding::Same => "same",
            Padding::Valid => "valid",
        }
    }
}

/// Typed description of one layer in a chromosome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerGene {
    Convolution {
        filters: usize,
        kernel_size: usize,
        stride: usize,
        padding: Padding,
        activation: Activation,
    },
    MaxPool {
        window: usize,
        stride: usize,
    },
    /// `hidden == None` is the terminal output layer: one linear unit per class.
    FullyConnected {
        hidden: Option<usize>,
        activation: Activation,
    },
}

impl LayerGene {
    pub fn output() -> Self {
        LayerGene::FullyConnected {
            hidden: None,
            activation: Activation::Linear,
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, LayerGene::FullyConnected { hidden: None, .. })
    }

    pub fn is_convolution(&self) -> bool {
        matches!(self, LayerGene::Convolution { .. })
    }

    pub fn is_pool(&self) -> bool {
        matches!(self, LayerGene::MaxPool { .. })
    }

    /// Spatial `(rows, cols)` after this layer, or `None` if it does not fit.
    ///
    /// Fully-connected genes leave the spatial size untouched.
    pub fn output_size(&self, (rows, cols): (usize, usize)) -> Option<(usize, usize)> {
        let slide = |n: usize, window: usize, padding: usize, stride: usize| {
            let padded = n + 2 * padding;
            (padded >= window && stride > 0).then(|| (padded - window) / stride + 1)
        };
        match *self {
            LayerGene::Convolution {
                kernel_size,
                stride,
                padding,
                ..
            } => {
                let p = padding.amount(kernel_size);
                Some((
                    slide(rows, kernel_size, p, stride)?,
                    slide(cols, kernel_size, p, stride)?,
                ))
            }
            LayerGene::MaxPool { window, stride } => {
                Some((slide(rows, window, 0, stride)?, slide(cols, window, 0, stride)?))
            }
            LayerGene::FullyConnected { .. } => Some((rows, cols)),
        }
    }
}

impl fmt::Display for LayerGene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerGene::Convolution {
                filters,
                kernel_size,
                stride,
                padding,
                activation,
            } => write!(
                f,
                "CONVOLUTION ({filters} filters {kernel_size}x{kernel_size}, stride={stride}, {} padding + {activation})",
                padding.name()
            ),
            LayerGene::MaxPool { window, stride } => {
                write!(f, "MAX_POOL ({window}x{window}, stride={stride})")
            }
            LayerGene::FullyConnected {
                hidden: Some(size),
                activation,
            } => write!(f, "FC({size},{activation})"),
            LayerGene::FullyConnected { hidden: None, .. } => f.write_str("FC output"),
        }
    }
}

impl FromStr for LayerGene {
    type Err = NetworkError;

    /// Parses one token of the architecture language.
    ///
    /// Accepts `CONVOLUTION (...)`, `MAX_POOL (...)`, `FC(<N>,<Act>)`,
    /// `FC output` and the older hidden form `FC (<N> + <Act>)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let malformed = || NetworkError::MalformedArchitecture(token.to_string());

        if let Some(rest) = token.strip_prefix("CONVOLUTION") {
            parse_convolution(parenthesized(rest).ok_or_else(malformed)?, token)
        } else if let Some(rest) = token.strip_prefix("MAX_POOL") {
            parse_pool(parenthesized(rest).ok_or_else(malformed)?, token)
        } else if let Some(rest) = token.strip_prefix("FC") {
            if rest.trim() == "output" {
                return Ok(LayerGene::output());
            }
            let inside = parenthesized(rest).ok_or_else(malformed)?;
            let (size, activation) = inside
                .split_once(',')
                .or_else(|| inside.split_once('+'))
                .ok_or_else(malformed)?;
            let size = parse_count(size, token)?;
            let activation = activation.parse::<Activation>()?;
            Ok(LayerGene::FullyConnected {
                hidden: Some(size),
                activation,
            })
        } else {
            Err(malformed())
        }
    }
}

/// Text between the first `(` and the last `)`, if `rest` is `(...)`.
fn parenthesized(rest: &str) -> Option<&str> {
    let rest = rest.trim();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    Some(inner.trim())
}

fn parse_count(text: &str, token: &str) -> NetworkResult<usize> {
    text.trim()
        .parse::<usize>()
        .map_err(|_| NetworkError::MalformedArchitecture(token.to_string()))
}

/// `KxK` with equal sides.
fn parse_square(text: &str, token: &str) -> NetworkResult<usize> {
    let (a, b) = text
        .trim()
        .split_once('x')
        .ok_or_else(|| NetworkError::MalformedArchitecture(token.to_string()))?;
    let (a, b) = (parse_count(a, token)?, parse_count(b, token)?);
    if a != b {
        return Err(NetworkError::MalformedArchitecture(token.to_string()));
    }
    Ok(a)
}

fn parse_stride(part: &str, token: &str) -> Option<NetworkResult<usize>> {
    part.trim()
        .strip_prefix("stride=")
        .map(|value| parse_count(value, token))
}

fn parse_convolution(inside: &str, token: &str) -> NetworkResult<LayerGene> {
    let malformed = || NetworkError::MalformedArchitecture(token.to_string());
    let (shape, activation) = inside.split_once('+').ok_or_else(malformed)?;
    let activation = activation.parse::<Activation>()?;

    let mut filters = None;
    let mut stride = 1;
    let mut padding = None;
    for part in shape.split(',') {
        let part = part.trim();
        if let Some((count, kernel)) = part.split_once("filters") {
            filters = Some((parse_count(count, token)?, parse_square(kernel, token)?));
        } else if let Some(value) = parse_stride(part, token) {
            stride = value?;
        } else if let Some(kind) = part.strip_suffix("padding") {
            padding = match kind.trim() {
                "same" => Some(Padding::Same),
                "valid" => Some(Padding::Valid),
                _ => return Err(malformed()),
            };
        } else {
            return Err(malformed());
        }
    }

    let (filters, kernel_size) = filters.ok_or_else(malformed)?;
    Ok(LayerGene::Convolution {
        filters,
        kernel_size,
        stride,
        padding: padding.ok_or_else(malformed)?,
        activation,
    })
}

fn parse_pool(inside: &str, token: &str) -> NetworkResult<LayerGene> {
    let (window, stride) = inside
        .split_once(',')
        .ok_or_else(|| NetworkError::MalformedArchitecture(token.to_string()))?;
    let stride = parse_stride(stride, token)
        .ok_or_else(|| NetworkError::MalformedArchitecture(token.to_string()))??;
    Ok(LayerGene::MaxPool {
        window: parse_square(window, token)?,
        stride,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_tokens() {
        let conv = LayerGene::Convolution {
            filters: 8,
            kernel_size: 3,
            stride: 1,
            padding: Padding::Same,
            activation: Activation::ReLU,
        };
        assert_eq!(
            conv.to_string(),
            "CONVOLUTION (8 filters 3x3, stride=1, same padding + ReLU)"
        );
        assert_eq!(
            LayerGene::MaxPool {
                window: 2,
                stride: 2
            }
            .to_string(),
            "MAX_POOL (2x2, stride=2)"
        );
        assert_eq!(
            LayerGene::FullyConnected {
                hidden: Some(128),
                activation: Activation::ReLU
            }
            .to_string(),
            "FC(128,ReLU)"
        );
        assert_eq!(LayerGene::output().to_string(), "FC output");
    }

    #[test]
    fn test_parse_tokens() {
        let conv: LayerGene = "CONVOLUTION (32 filters 5x5, stride=2, valid padding + leakyrelu)"
            .parse()
            .unwrap();
        assert_eq!(
            conv,
            LayerGene::Convolution {
                filters: 32,
                kernel_size: 5,
                stride: 2,
                padding: Padding::Valid,
                activation: Activation::LeakyReLU,
            }
        );

        let pool: LayerGene = " MAX_POOL (3x3, stride=1) ".parse().unwrap();
        assert_eq!(pool, LayerGene::MaxPool { window: 3, stride: 1 });

        let fc: LayerGene = "FC(64,Sigmoid)".parse().unwrap();
        assert_eq!(
            fc,
            LayerGene::FullyConnected {
                hidden: Some(64),
                activation: Activation::Sigmoid
            }
        );
        assert!("FC output".parse::<LayerGene>().unwrap().is_output());
    }

    #[test]
    fn test_parse_legacy_forms() {
        let fc: LayerGene = "FC (128 + ReLU)".parse().unwrap();
        assert_eq!(
            fc,
            LayerGene::FullyConnected {
                hidden: Some(128),
                activation: Activation::ReLU
            }
        );

        // stride omitted
        let conv: LayerGene = "CONVOLUTION(8 filters 3x3, same padding + Sigmoid)"
            .parse()
            .unwrap();
        assert!(matches!(conv, LayerGene::Convolution { stride: 1, .. }));
    }

    #[test]
    fn test_parse_errors() {
        let err = "CONVOLUTION (8 filters 3x3, stride=1, same padding + Tanh)"
            .parse::<LayerGene>()
            .unwrap_err();
        assert_eq!(err, NetworkError::UnknownActivation("Tanh".into()));

        for token in [
            "DROPOUT (0.5)",
            "MAX_POOL (2x3, stride=2)",
            "MAX_POOL (2x2)",
            "CONVOLUTION (8 filters 3x3, stride=1 + ReLU)",
            "FC(abc,ReLU)",
        ] {
            assert!(
                matches!(
                    token.parse::<LayerGene>(),
                    Err(NetworkError::MalformedArchitecture(_))
                ),
                "{token} should be malformed"
            );
        }
    }

    #[test]
    fn test_output_size() {
        let conv = LayerGene::Convolution {
            filters: 4,
            kernel_size: 7,
            stride: 2,
            padding: Padding::Valid,
            activation: Activation::ReLU,
        };
        assert_eq!(conv.output_size((28, 28)), Some((11, 11)));
        assert_eq!(conv.output_size((6, 6)), None);

        let pool = LayerGene::MaxPool { window: 3, stride: 2 };
        assert_eq!(pool.output_size((11, 11)), Some((5, 5)));
        assert_eq!(LayerGene::output().output_size((5, 5)), Some((5, 5)));
    }
}

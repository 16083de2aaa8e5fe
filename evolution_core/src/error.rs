//! Error types for network construction, parsing and execution.
//!
//! Builder steps, architecture parsing and the layer chain all report failures
//! through [`NetworkError`] instead of panicking, so the genetic search can
//! branch on an invalid architecture and regenerate it.

use std::fmt;

/// Result type alias for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors raised while building, parsing or running a network.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// A layer cannot be attached to the output of the previous one
    InvalidArchitecture { layer: String, reason: String },

    /// Activation name in an architecture string matched no known variant
    UnknownActivation(String),

    /// Architecture token could not be parsed
    MalformedArchitecture(String),

    /// Sample shape differs from what the network expects
    InputShape { expected: usize, got: usize },

    /// `backward_batch` called without a matching `forward_batch`
    MissingForwardCache { layer: String },

    /// Batch of gradients does not line up with the cached forward batch
    BatchMismatch { expected: usize, got: usize },

    /// Image label is not a valid class index
    LabelOutOfRange { label: usize, classes: usize },

    /// Network has no layers
    EmptyNetwork,
}

impl NetworkError {
    pub(crate) fn invalid(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        NetworkError::InvalidArchitecture {
            layer: layer.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error marks an architecture the GA should regenerate.
    pub fn is_invalid_architecture(&self) -> bool {
        matches!(
            self,
            NetworkError::InvalidArchitecture { .. } | NetworkError::EmptyNetwork
        )
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::InvalidArchitecture { layer, reason } => {
                write!(f, "Invalid architecture at {layer}: {reason}")
            }
            NetworkError::UnknownActivation(name) => write!(f, "Unknown activation: {name}"),
            NetworkError::MalformedArchitecture(token) => {
                write!(f, "Malformed architecture token: '{token}'")
            }
            NetworkError::InputShape { expected, got } => write!(
                f,
                "Input shape mismatch: expected {expected} values, got {got}"
            ),
            NetworkError::MissingForwardCache { layer } => write!(
                f,
                "Backward pass on {layer} requires a forward pass over the same batch first"
            ),
            NetworkError::BatchMismatch { expected, got } => write!(
                f,
                "Gradient batch size {got} does not match cached forward batch of {expected}"
            ),
            NetworkError::LabelOutOfRange { label, classes } => {
                write!(f, "Label {label} is outside the {classes} output classes")
            }
            NetworkError::EmptyNetwork => write!(f, "Network must contain at least one layer"),
        }
    }
}

impl std::error::Error for NetworkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = NetworkError::invalid("MaxPool #2", "window 3 exceeds input 2x2");
        assert_eq!(
            err.to_string(),
            "Invalid architecture at MaxPool #2: window 3 exceeds input 2x2"
        );

        let err = NetworkError::UnknownActivation("Tanh".into());
        assert!(err.to_string().contains("Tanh"));
    }

    #[test]
    fn test_invalid_architecture_classification() {
        assert!(NetworkError::invalid("x", "y").is_invalid_architecture());
        assert!(NetworkError::EmptyNetwork.is_invalid_architecture());
        assert!(!NetworkError::UnknownActivation("x".into()).is_invalid_architecture());
    }
}

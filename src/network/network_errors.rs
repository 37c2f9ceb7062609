use crate::layer::layer_errors::{BackwardLayerError, ForwardLayerError, LayerBuildError};
use std::fmt;

/// An error encountered while building or running a [`Network`](crate::network::Network)
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// a network needs at least one layer
    NoLayers,
    /// one of the per-layer argument slices passed to [`Network::new`](crate::network::Network::new) was not `layer_count` long
    MismatchedSpecLength {
        argument: &'static str,
        expected: usize,
        actual: usize,
    },
    /// layer `layer` expects `expected` inputs, but the layer before it produces `actual` outputs
    MismatchedLayerChain {
        layer: usize,
        expected: usize,
        actual: usize,
    },
    /// layer `layer` could not be built
    Build {
        layer: usize,
        source: LayerBuildError,
    },
    /// layer `layer` failed during forward
    Forward {
        layer: usize,
        source: ForwardLayerError,
    },
    /// layer `layer` failed during backward
    Backward {
        layer: usize,
        source: BackwardLayerError,
    },
    /// backward reached layer `layer`, but the layer before it has never been run forward, so there's no input to replay
    BackwardBeforeForward { layer: usize },
    /// the target vector was not as long as the network's output
    MissizedTarget { actual: usize, expected: usize },
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkError::NoLayers => write!(f, "a network needs at least one layer"),
            NetworkError::MismatchedSpecLength {
                argument,
                expected,
                actual,
            } => write!(
                f,
                "`{}` has {} entries, but the network has {} layers",
                argument, actual, expected
            ),
            NetworkError::MismatchedLayerChain {
                layer,
                expected,
                actual,
            } => write!(
                f,
                "layer {} expects {} inputs, but layer {} produces {} outputs",
                layer,
                expected,
                layer.saturating_sub(1),
                actual
            ),
            NetworkError::Build { layer, source } => {
                write!(f, "unable to build layer {}: {}", layer, source)
            }
            NetworkError::Forward { layer, source } => {
                write!(f, "forward failed at layer {}: {}", layer, source)
            }
            NetworkError::Backward { layer, source } => {
                write!(f, "backward failed at layer {}: {}", layer, source)
            }
            NetworkError::BackwardBeforeForward { layer } => write!(
                f,
                "backward called on layer {} before layer {} ran forward",
                layer,
                layer.saturating_sub(1)
            ),
            NetworkError::MissizedTarget { actual, expected } => write!(
                f,
                "target has length {}, but the network produces {} outputs",
                actual, expected
            ),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetworkError::Build { source, .. } => Some(source),
            NetworkError::Forward { source, .. } => Some(source),
            NetworkError::Backward { source, .. } => Some(source),
            _ => None,
        }
    }
}

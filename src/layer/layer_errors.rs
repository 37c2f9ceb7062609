//! Error types relating to the creation and use of [`Layer`](crate::layer::Layer)s

use super::spline::spline_errors::SplineError;
use std::fmt::{self, Formatter};

/// Which axis of a bulk construction payload disagreed with the rest
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum GridDimension {
    /// the number of input rows
    Input,
    /// the number of output columns within an input row
    Output,
    /// the number of control points in a cell
    Points,
    /// the number of segment parameter tuples in a cell
    Segments,
}

impl fmt::Display for GridDimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            GridDimension::Input => "input",
            GridDimension::Output => "output",
            GridDimension::Points => "control point",
            GridDimension::Segments => "segment",
        };
        write!(f, "{}", name)
    }
}

#[allow(missing_docs)]
#[derive(Debug, PartialEq, Clone)]
pub enum LayerBuildError {
    /// a layer needs at least one input and one output
    ZeroDimension {
        input_dimension: usize,
        output_dimension: usize,
    },
    /// the spline domain `[0, max]` must have a finite, positive width
    InvalidDomain { max: f64 },
    /// the points grid and params grid passed to [`Layer::from_data`](crate::layer::Layer::from_data) disagree on their shape
    DimensionMismatch {
        dimension: GridDimension,
        expected: usize,
        actual: usize,
    },
    /// the spline connecting `input` to `output` could not be built
    Spline {
        input: usize,
        output: usize,
        source: SplineError,
    },
    /// a stored layer holds `actual` splines, but its dimensions call for one spline per (input, output) pair
    SplineCount {
        input_dimension: usize,
        output_dimension: usize,
        actual: usize,
    },
    /// the requested layer is too large to address: the spline count or the control points per spline overflow `usize`
    Oversized {
        input_dimension: usize,
        output_dimension: usize,
        detail: usize,
    },
}

impl fmt::Display for LayerBuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LayerBuildError::ZeroDimension {
                input_dimension,
                output_dimension,
            } => write!(
                f,
                "layer dimensions must be nonzero, got {} inputs and {} outputs",
                input_dimension, output_dimension
            ),
            LayerBuildError::InvalidDomain { max } => {
                write!(f, "spline domain upper bound must be finite and positive, got {}", max)
            }
            LayerBuildError::DimensionMismatch {
                dimension,
                expected,
                actual,
            } => write!(
                f,
                "mismatched {} dimension. Expected {}, got {}",
                dimension, expected, actual
            ),
            LayerBuildError::Spline {
                input,
                output,
                source,
            } => write!(
                f,
                "unable to build spline from input {} to output {}: {}",
                input, output, source
            ),
            LayerBuildError::SplineCount {
                input_dimension,
                output_dimension,
                actual,
            } => write!(
                f,
                "a layer with {} inputs and {} outputs needs one spline per pair, found {} splines",
                input_dimension, output_dimension, actual
            ),
            LayerBuildError::Oversized {
                input_dimension,
                output_dimension,
                detail,
            } => write!(
                f,
                "a layer with {} inputs, {} outputs and {} interior points per spline is too large",
                input_dimension, output_dimension, detail
            ),
        }
    }
}

impl std::error::Error for LayerBuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LayerBuildError::Spline { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, PartialEq, Clone)]
pub enum ForwardLayerError {
    /// the length of the input vector was not equal to the input dimension of the layer
    MissizedInput { actual: usize, expected: usize },
    /// the spline connecting `input` to `output` could not evaluate its input
    Spline {
        input: usize,
        output: usize,
        source: SplineError,
    },
    /// row `sample` of a batch failed
    BatchSample {
        sample: usize,
        source: Box<ForwardLayerError>,
    },
}

impl fmt::Display for ForwardLayerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ForwardLayerError::MissizedInput { actual, expected } => {
                write!(f, "Bad input length. Expected {}, got {}", expected, actual)
            }
            ForwardLayerError::Spline {
                input,
                output,
                source,
            } => write!(
                f,
                "spline from input {} to output {} failed: {}",
                input, output, source
            ),
            ForwardLayerError::BatchSample { sample, source } => {
                write!(f, "batch sample {} failed: {}", sample, source)
            }
        }
    }
}

impl std::error::Error for ForwardLayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ForwardLayerError::Spline { source, .. } => Some(source),
            ForwardLayerError::BatchSample { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, PartialEq, Clone)]
pub enum BackwardLayerError {
    /// the length of the input vector was not equal to the input dimension of the layer
    MissizedInput { actual: usize, expected: usize },
    /// the length of the gradient vector was not equal to the output dimension of the layer
    MissizedGradient { actual: usize, expected: usize },
    /// a batched backward call received a different number of inputs and gradients
    MismatchedBatch { inputs: usize, gradients: usize },
    /// the spline connecting `input` to `output` could not evaluate its input
    Spline {
        input: usize,
        output: usize,
        source: SplineError,
    },
    /// sample `sample` of a batch failed
    BatchSample {
        sample: usize,
        source: Box<BackwardLayerError>,
    },
}

impl fmt::Display for BackwardLayerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BackwardLayerError::MissizedInput { actual, expected } => write!(
                f,
                "received input vector of length {} but required vector of length {}",
                actual, expected
            ),
            BackwardLayerError::MissizedGradient { actual, expected } => write!(
                f,
                "received gradient vector of length {} but required vector of length {}",
                actual, expected
            ),
            BackwardLayerError::MismatchedBatch { inputs, gradients } => write!(
                f,
                "batch has {} inputs but {} gradient vectors",
                inputs, gradients
            ),
            BackwardLayerError::Spline {
                input,
                output,
                source,
            } => write!(
                f,
                "spline from input {} to output {} failed: {}",
                input, output, source
            ),
            BackwardLayerError::BatchSample { sample, source } => {
                write!(f, "batch sample {} failed: {}", sample, source)
            }
        }
    }
}

impl std::error::Error for BackwardLayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackwardLayerError::Spline { source, .. } => Some(source),
            BackwardLayerError::BatchSample { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_build_error_send() {
        fn assert_send<T: Send>() {}
        assert_send::<LayerBuildError>();
    }

    #[test]
    fn test_build_error_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<LayerBuildError>();
    }

    #[test]
    fn test_forward_error_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ForwardLayerError>();
    }

    #[test]
    fn test_forward_error_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<ForwardLayerError>();
    }

    #[test]
    fn test_backward_error_send() {
        fn assert_send<T: Send>() {}
        assert_send::<BackwardLayerError>();
    }

    #[test]
    fn test_backward_error_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<BackwardLayerError>();
    }

    #[test]
    fn test_batch_sample_source_chain() {
        let inner = BackwardLayerError::MissizedGradient {
            actual: 1,
            expected: 2,
        };
        let error = BackwardLayerError::BatchSample {
            sample: 3,
            source: Box::new(inner.clone()),
        };
        assert_eq!(
            error.to_string(),
            "batch sample 3 failed: received gradient vector of length 1 but required vector of length 2"
        );
        assert_eq!(error.source().map(|e| e.to_string()), Some(inner.to_string()));
    }
}

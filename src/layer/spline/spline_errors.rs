//! Error types relating to the creation and evaluation of [`Spline`](crate::layer::spline::Spline)s

use std::fmt;

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum SplineError {
    /// a spline needs at least two control points to span a single segment
    InvalidPointCount { actual: usize },
    /// there must be exactly one set of segment parameters per pair of consecutive control points
    InvalidParameterCount { expected: usize, actual: usize },
    /// every control point is an (x, y) pair
    InvalidPointDimension { index: usize, actual: usize },
    /// every set of segment parameters is an (a, b, c, d) tuple
    InvalidParameterDimension { index: usize, actual: usize },
    /// the control point at `index + 1` does not lie strictly to the right of the one at `index`,
    /// so the segment between them has no width
    DegenerateSegment { index: usize },
    /// the spline was evaluated outside `[lower, upper]`, or at NaN
    OutOfBounds { x: f64, lower: f64, upper: f64 },
    /// tried to move a control point that doesn't exist
    PointIndexOutOfRange { index: usize, len: usize },
}

impl fmt::Display for SplineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SplineError::InvalidPointCount { actual } => {
                write!(f, "spline has {} control points, but needs at least 2", actual)
            }
            SplineError::InvalidParameterCount { expected, actual } => write!(
                f,
                "spline has {} segment parameter sets, but expected {} (|control points| - 1)",
                actual, expected
            ),
            SplineError::InvalidPointDimension { index, actual } => write!(
                f,
                "control point {} has {} coordinates, but expected 2",
                index, actual
            ),
            SplineError::InvalidParameterDimension { index, actual } => write!(
                f,
                "segment {} has {} coefficients, but expected 4",
                index, actual
            ),
            SplineError::DegenerateSegment { index } => write!(
                f,
                "control points {} and {} are not in strictly ascending x order",
                index,
                index + 1
            ),
            SplineError::OutOfBounds { x, lower, upper } => {
                write!(f, "input {} is outside the spline domain [{}, {}]", x, lower, upper)
            }
            SplineError::PointIndexOutOfRange { index, len } => write!(
                f,
                "control point index {} is out of range for a spline with {} points",
                index, len
            ),
        }
    }
}

impl std::error::Error for SplineError {}

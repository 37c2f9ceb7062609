pub mod spline_errors;

use log::trace;
use serde::{Deserialize, Serialize};
use spline_errors::SplineError;

/// An (x, y) anchor of a [`Spline`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ControlPoint {
    pub x: f64,
    pub y: f64,
}

/// The cubic `a + b·u + c·u² + d·u³` governing one segment of a [`Spline`], where `u` is the distance from the segment's left control point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct SegmentParameters {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl SegmentParameters {
    /// evaluate the segment polynomial at local coordinate `u`
    pub fn evaluate(&self, u: f64) -> f64 {
        self.a + u * (self.b + u * (self.c + u * self.d))
    }
}

/// A natural cubic spline over an ordered set of control points.
///
/// Segment `i` spans control points `i` and `i + 1`. Each segment owns one gradient slot, which is applied to the segment's *left* control point,
/// so the last control point of a spline is never moved by [`Spline::apply_grad`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SplineRecord", into = "SplineRecord")]
pub struct Spline {
    points: Vec<ControlPoint>,
    params: Vec<SegmentParameters>,
    /// one slot per segment
    gradients: Vec<f64>,
}

/// the nested-array form a spline is persisted as; loading goes back through [`Spline::new`] so a bad payload is rejected
#[derive(Serialize, Deserialize)]
struct SplineRecord {
    points: Vec<Vec<f64>>,
    params: Vec<Vec<f64>>,
}

impl Spline {
    /// build a spline from `points`, a list of `[x, y]` pairs, and `params`, a list of `[a, b, c, d]` tuples, one per segment.
    ///
    /// The parameters are stored as given. Call [`Spline::interpolation`] to derive them from the control points instead.
    ///
    /// # Errors
    /// Returns a [`SplineError`] if there are fewer than 2 points, the number of parameter tuples isn't `points.len() - 1`,
    /// any point or tuple has the wrong number of entries, or the x-coordinates are not strictly ascending.
    ///
    /// # Examples
    /// ```
    /// use splinenet::layer::spline::Spline;
    /// let points = vec![vec![0.0, 0.0], vec![0.5, 1.0], vec![1.0, 2.0]];
    /// let params = vec![vec![0.0; 4]; 2];
    /// let mut spline = Spline::new(points, params)?;
    /// spline.interpolation();
    /// assert!((spline.forward(0.25)? - 0.5).abs() < 1e-9);
    /// # Ok::<(), splinenet::layer::spline::spline_errors::SplineError>(())
    /// ```
    pub fn new(points: Vec<Vec<f64>>, params: Vec<Vec<f64>>) -> Result<Self, SplineError> {
        if points.len() < 2 {
            return Err(SplineError::InvalidPointCount {
                actual: points.len(),
            });
        }
        if params.len() != points.len() - 1 {
            return Err(SplineError::InvalidParameterCount {
                expected: points.len() - 1,
                actual: params.len(),
            });
        }
        let mut control_points = Vec::with_capacity(points.len());
        for (index, point) in points.iter().enumerate() {
            match point.as_slice() {
                &[x, y] => control_points.push(ControlPoint { x, y }),
                _ => {
                    return Err(SplineError::InvalidPointDimension {
                        index,
                        actual: point.len(),
                    })
                }
            }
        }
        let mut segments = Vec::with_capacity(params.len());
        for (index, tuple) in params.iter().enumerate() {
            match tuple.as_slice() {
                &[a, b, c, d] => segments.push(SegmentParameters { a, b, c, d }),
                _ => {
                    return Err(SplineError::InvalidParameterDimension {
                        index,
                        actual: tuple.len(),
                    })
                }
            }
        }
        Spline::from_parts(control_points, segments)
    }

    /// build a flat spline of `detail + 2` control points evenly spaced over `[0, max]`, with every height and coefficient at zero
    pub(crate) fn uniform(detail: usize, max: f64) -> Result<Self, SplineError> {
        let points = linspace(0.0, max, detail + 2)
            .into_iter()
            .map(|x| ControlPoint { x, y: 0.0 })
            .collect();
        Spline::from_parts(points, vec![SegmentParameters::default(); detail + 1])
    }

    fn from_parts(
        points: Vec<ControlPoint>,
        params: Vec<SegmentParameters>,
    ) -> Result<Self, SplineError> {
        if let Some(index) = points.windows(2).position(|pair| !(pair[1].x > pair[0].x)) {
            return Err(SplineError::DegenerateSegment { index });
        }
        let gradients = vec![0.0; params.len()];
        Ok(Spline {
            points,
            params,
            gradients,
        })
    }

    /// Solve the natural cubic spline through the current control points and overwrite every segment's parameters.
    ///
    /// The second derivative is pinned to 0 at both ends of the domain and the resulting tridiagonal system is solved with the Thomas algorithm.
    pub fn interpolation(&mut self) {
        let n = self.params.len();
        let x = |i: usize| self.points[i].x;
        let y = |i: usize| self.points[i].y;
        let h: Vec<f64> = (0..n).map(|i| x(i + 1) - x(i)).collect();

        let mut alpha = vec![0.0; n];
        for i in 1..n {
            alpha[i] = 3.0 / h[i] * (y(i + 1) - y(i)) - 3.0 / h[i - 1] * (y(i) - y(i - 1));
        }

        // forward elimination. l[0] = 1 and mu[0] = z[0] = 0 encode the natural left boundary
        let mut l = vec![1.0; n];
        let mut mu = vec![0.0; n];
        let mut z = vec![0.0; n];
        for i in 1..n {
            l[i] = 2.0 * (x(i + 1) - x(i - 1)) - h[i - 1] * mu[i - 1];
            mu[i] = h[i] / l[i];
            z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
        }

        // back substitution, starting from the natural right boundary
        let mut new_params = vec![SegmentParameters::default(); n];
        let mut c_next = 0.0;
        for j in (0..n).rev() {
            let c = z[j] - mu[j] * c_next;
            new_params[j] = SegmentParameters {
                a: y(j),
                b: (y(j + 1) - y(j)) / h[j] - h[j] * (c_next + 2.0 * c) / 3.0,
                c,
                d: (c_next - c) / (3.0 * h[j]),
            };
            c_next = c;
        }
        self.params = new_params;
        trace!("interpolated spline params: {:?}", self.params);
    }

    /// the index of the segment owning `x`. A point sitting exactly on an interior control point belongs to the segment on its left
    fn segment_index(&self, x: f64) -> Result<usize, SplineError> {
        let (lower, upper) = self.domain();
        if !(lower..=upper).contains(&x) {
            return Err(SplineError::OutOfBounds { x, lower, upper });
        }
        let first_at_or_above = self.points.partition_point(|point| point.x < x);
        Ok(first_at_or_above.max(1) - 1)
    }

    /// evaluate the spline at `x`
    ///
    /// # Errors
    /// Returns [`SplineError::OutOfBounds`] if `x` lies outside the spline's [domain](Spline::domain) or is NaN
    pub fn forward(&self, x: f64) -> Result<f64, SplineError> {
        let segment = self.segment_index(x)?;
        Ok(self.params[segment].evaluate(x - self.points[segment].x))
    }

    /// compute the residual `(forward(x) - y) + d_y` and the segment it belongs to, without touching the gradient accumulator
    pub(crate) fn residual(&self, x: f64, d_y: f64, y: f64) -> Result<(usize, f64), SplineError> {
        let segment = self.segment_index(x)?;
        let predicted = self.params[segment].evaluate(x - self.points[segment].x);
        Ok((segment, (predicted - y) + d_y))
    }

    pub(crate) fn accumulate_gradient(&mut self, segment: usize, residual: f64) {
        self.gradients[segment] += residual;
    }

    /// Blend the local error at `x` against the target `y` with the upstream gradient `d_y`, add the result to the gradient slot of the segment owning `x`, and return it.
    ///
    /// Nothing is applied until [`Spline::apply_grad`] is called, so repeated calls accumulate.
    ///
    /// # Errors
    /// Returns [`SplineError::OutOfBounds`] if `x` lies outside the spline's domain. The accumulator is left untouched.
    pub fn backward(&mut self, x: f64, d_y: f64, y: f64) -> Result<f64, SplineError> {
        let (segment, residual) = self.residual(x, d_y, y)?;
        self.accumulate_gradient(segment, residual);
        Ok(residual)
    }

    /// Move every control point with a nonzero gradient by `-learning_rate * gradient`, clear its slot, and re-solve the interpolation.
    ///
    /// Gradient slot `i` moves control point `i`, so the last control point never moves.
    /// If every slot is zero the call changes nothing, not even the segment parameters.
    pub fn apply_grad(&mut self, learning_rate: f64) {
        let mut moved = false;
        for (point, gradient) in self.points.iter_mut().zip(self.gradients.iter_mut()) {
            if *gradient != 0.0 {
                point.y -= learning_rate * *gradient;
                *gradient = 0.0;
                moved = true;
            }
        }
        if moved {
            self.interpolation();
        }
    }

    /// clear the gradient accumulator without applying it
    pub fn zero_gradients(&mut self) {
        self.gradients.iter_mut().for_each(|g| *g = 0.0);
    }

    /// the accumulated, not-yet-applied gradient of each segment
    pub fn gradients(&self) -> &[f64] {
        &self.gradients
    }

    /// set the height of control point `index` and re-solve the interpolation
    ///
    /// # Errors
    /// Returns [`SplineError::PointIndexOutOfRange`] if there is no control point at `index`
    pub fn set_point_height(&mut self, index: usize, y: f64) -> Result<(), SplineError> {
        let len = self.points.len();
        let point = self
            .points
            .get_mut(index)
            .ok_or(SplineError::PointIndexOutOfRange { index, len })?;
        point.y = y;
        self.interpolation();
        Ok(())
    }

    /// a copy of the control points
    pub fn get_points(&self) -> Vec<ControlPoint> {
        self.points.clone()
    }

    /// a copy of the segment parameters
    pub fn get_params(&self) -> Vec<SegmentParameters> {
        self.params.clone()
    }

    /// the inclusive `(lower, upper)` range of inputs this spline can evaluate
    pub fn domain(&self) -> (f64, f64) {
        // construction guarantees at least two points
        (self.points[0].x, self.points[self.points.len() - 1].x)
    }

    #[allow(missing_docs)]
    pub fn segment_count(&self) -> usize {
        self.params.len()
    }

    /// every stored number: two coordinates per control point and four coefficients per segment
    pub fn parameter_count(&self) -> usize {
        2 * self.points.len() + 4 * self.params.len()
    }

    /// the number of values gradient descent can change (one control point height per segment)
    pub fn trainable_parameter_count(&self) -> usize {
        self.gradients.len()
    }
}

impl PartialEq for Spline {
    // the gradient accumulator is training state, not part of the shape
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points && self.params == other.params
    }
}

impl TryFrom<SplineRecord> for Spline {
    type Error = SplineError;

    fn try_from(record: SplineRecord) -> Result<Self, Self::Error> {
        Spline::new(record.points, record.params)
    }
}

impl From<Spline> for SplineRecord {
    fn from(spline: Spline) -> Self {
        SplineRecord {
            points: spline.points.iter().map(|p| vec![p.x, p.y]).collect(),
            params: spline
                .params
                .iter()
                .map(|s| vec![s.a, s.b, s.c, s.d])
                .collect(),
        }
    }
}

/// `num` evenly spaced values from `min` to `max`, inclusive. The last value is exactly `max`
pub(crate) fn linspace(min: f64, max: f64, num: usize) -> Vec<f64> {
    let mut values = Vec::with_capacity(num);
    let num_intervals = num - 1;
    let step_size = (max - min) / num_intervals as f64;
    for i in 0..num_intervals {
        values.push(min + i as f64 * step_size);
    }
    values.push(max);
    values
}

#[cfg(test)]
mod test {
    use super::*;
    use statrs::assert_almost_eq;
    use test_log::test;

    fn to_rows(points: &[(f64, f64)]) -> Vec<Vec<f64>> {
        points.iter().map(|&(x, y)| vec![x, y]).collect()
    }

    /// y = 5x sampled at six evenly spaced points, already interpolated
    fn linear_spline() -> Spline {
        let points = to_rows(&[
            (0.0, 0.0),
            (0.2, 1.0),
            (0.4, 2.0),
            (0.6, 3.0),
            (0.8, 4.0),
            (1.0, 5.0),
        ]);
        let mut spline = Spline::new(points, vec![vec![0.0; 4]; 5]).unwrap();
        spline.interpolation();
        spline
    }

    #[test]
    fn test_new() {
        let spline = Spline::new(
            to_rows(&[(0.0, 0.0), (1.0, 1.0)]),
            vec![vec![0.0, 1.0, 0.0, 0.0]],
        )
        .unwrap();
        assert_eq!(spline.segment_count(), 1);
        assert_eq!(spline.gradients(), &[0.0]);
        assert_eq!(spline.get_params()[0].b, 1.0);
    }

    #[test]
    fn test_new_too_few_points() {
        let result = Spline::new(to_rows(&[(0.0, 0.0)]), vec![]);
        assert_eq!(result.unwrap_err(), SplineError::InvalidPointCount { actual: 1 });
    }

    #[test]
    fn test_new_wrong_param_count() {
        let result = Spline::new(
            to_rows(&[(0.0, 0.0), (0.5, 0.0), (1.0, 0.0)]),
            vec![vec![0.0; 4]],
        );
        assert_eq!(
            result.unwrap_err(),
            SplineError::InvalidParameterCount {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_new_bad_point_dimension() {
        let points = vec![vec![0.0, 0.0], vec![0.5, 1.0, 7.0], vec![1.0, 2.0]];
        let result = Spline::new(points, vec![vec![0.0; 4]; 2]);
        assert_eq!(
            result.unwrap_err(),
            SplineError::InvalidPointDimension {
                index: 1,
                actual: 3
            }
        );
    }

    #[test]
    fn test_new_bad_param_dimension() {
        let params = vec![vec![0.0; 4], vec![0.0; 3]];
        let result = Spline::new(to_rows(&[(0.0, 0.0), (0.5, 1.0), (1.0, 2.0)]), params);
        assert_eq!(
            result.unwrap_err(),
            SplineError::InvalidParameterDimension {
                index: 1,
                actual: 3
            }
        );
    }

    #[test]
    fn test_new_duplicate_x() {
        let result = Spline::new(
            to_rows(&[(0.0, 0.0), (0.5, 1.0), (0.5, 2.0)]),
            vec![vec![0.0; 4]; 2],
        );
        assert_eq!(result.unwrap_err(), SplineError::DegenerateSegment { index: 1 });
    }

    #[test]
    fn test_new_descending_x() {
        let result = Spline::new(to_rows(&[(1.0, 0.0), (0.0, 1.0)]), vec![vec![0.0; 4]]);
        assert_eq!(result.unwrap_err(), SplineError::DegenerateSegment { index: 0 });
    }

    #[test]
    fn test_uniform() {
        let spline = Spline::uniform(8, 2.0).unwrap();
        let points = spline.get_points();
        assert_eq!(points.len(), 10);
        assert_eq!(points[0].x, 0.0);
        assert_eq!(points[9].x, 2.0);
        assert_eq!(spline.segment_count(), 9);
        assert!(points.iter().all(|p| p.y == 0.0));
    }

    #[test]
    fn test_linspace_ends_exactly_at_max() {
        let values = linspace(0.0, 0.3, 4);
        assert_eq!(values.len(), 4);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[3], 0.3);
    }

    #[test]
    fn test_interpolate_linear() {
        let spline = linear_spline();
        for (x, expected) in [(0.0, 0.0), (0.25, 1.25), (0.5, 2.5), (0.75, 3.75), (1.0, 5.0)] {
            assert_almost_eq!(spline.forward(x).unwrap(), expected, 1e-9);
        }
    }

    #[test]
    fn test_interpolate_flat_is_fixed_point() {
        let mut spline = Spline::uniform(4, 1.0).unwrap();
        let points_before = spline.get_points();
        spline.interpolation();
        assert_eq!(spline.get_points(), points_before);
        assert!(spline
            .get_params()
            .iter()
            .all(|p| *p == SegmentParameters::default()));
    }

    #[test]
    fn test_interpolate_hits_control_points() {
        let points = to_rows(&[(0.0, 1.0), (0.3, -2.0), (1.0, 0.5), (1.5, 4.0), (2.0, 3.0)]);
        let mut spline = Spline::new(points.clone(), vec![vec![0.0; 4]; 4]).unwrap();
        spline.interpolation();
        for point in points {
            assert_almost_eq!(spline.forward(point[0]).unwrap(), point[1], 1e-9);
        }
    }

    #[test]
    fn test_interpolate_natural_boundaries() {
        let points = to_rows(&[(0.0, 1.0), (0.3, -2.0), (1.0, 0.5), (2.0, 3.0)]);
        let mut spline = Spline::new(points, vec![vec![0.0; 4]; 3]).unwrap();
        spline.interpolation();
        let params = spline.get_params();
        assert_eq!(params[0].c, 0.0);
        // second derivative at the right end: 2c + 6d·h
        let last = params[2];
        assert_almost_eq!(2.0 * last.c + 6.0 * last.d * 1.0, 0.0, 1e-9);
    }

    #[test]
    fn test_forward_boundary_belongs_to_lower_segment() {
        // segment 0 is constant 1, segment 1 is constant 2, so the boundary value tells us which segment answered
        let spline = Spline::new(
            to_rows(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]),
            vec![vec![1.0, 0.0, 0.0, 0.0], vec![2.0, 0.0, 0.0, 0.0]],
        )
        .unwrap();
        assert_eq!(spline.forward(0.0).unwrap(), 1.0);
        assert_eq!(spline.forward(1.0).unwrap(), 1.0);
        assert_eq!(spline.forward(1.5).unwrap(), 2.0);
        assert_eq!(spline.forward(2.0).unwrap(), 2.0);
    }

    #[test]
    fn test_forward_out_of_bounds() {
        let spline = linear_spline();
        let expected = |x| SplineError::OutOfBounds {
            x,
            lower: 0.0,
            upper: 1.0,
        };
        assert_eq!(spline.forward(1.01).unwrap_err(), expected(1.01));
        assert_eq!(spline.forward(-0.01).unwrap_err(), expected(-0.01));
        assert!(spline.forward(f64::NAN).is_err());
        assert_eq!(spline, linear_spline());
    }

    #[test]
    fn test_backward_out_of_bounds_leaves_gradients() {
        let mut spline = linear_spline();
        assert!(spline.backward(3.0, 1.0, 0.0).is_err());
        assert!(spline.gradients().iter().all(|g| *g == 0.0));
    }

    #[test]
    fn test_backward_then_apply() {
        let mut spline = Spline::new(
            to_rows(&[(0.0, 0.0), (0.5, 1.0), (1.0, 2.0)]),
            vec![vec![0.0; 4]; 2],
        )
        .unwrap();
        spline.interpolation();
        // forward(0.25) = 0.5, so the residual against a target of 1.0 is -0.5
        let residual = spline.backward(0.25, 0.0, 1.0).unwrap();
        assert_almost_eq!(residual, -0.5, 1e-12);
        assert_almost_eq!(spline.gradients()[0], -0.5, 1e-12);
        assert_eq!(spline.gradients()[1], 0.0);

        spline.apply_grad(1.0);
        let points = spline.get_points();
        assert_almost_eq!(points[0].y, 0.5, 1e-12);
        assert_eq!(points[1].y, 1.0);
        assert_eq!(points[2].y, 2.0);
        assert!(spline.gradients().iter().all(|g| *g == 0.0));
        assert_almost_eq!(spline.forward(0.0).unwrap(), 0.5, 1e-12);
    }

    #[test]
    fn test_backward_accumulates() {
        let mut spline = linear_spline();
        let first = spline.backward(0.1, 0.25, 0.0).unwrap();
        let second = spline.backward(0.15, -0.5, 1.0).unwrap();
        assert_almost_eq!(first, 0.75, 1e-9);
        assert_almost_eq!(second, -0.75, 1e-9);
        assert_almost_eq!(spline.gradients()[0], 0.0, 1e-9);
    }

    #[test]
    fn test_backward_includes_upstream_gradient() {
        let mut spline = linear_spline();
        // x = 0.4 sits on the boundary between segments 1 and 2, so segment 1 owns it
        let residual = spline.backward(0.4, 2.0, 2.0).unwrap();
        assert_almost_eq!(residual, 2.0, 1e-9);
        assert_almost_eq!(spline.gradients()[1], 2.0, 1e-9);
        assert_eq!(spline.gradients()[2], 0.0);
    }

    #[test]
    fn test_apply_zero_gradient_is_noop() {
        // params deliberately not interpolated, so a re-solve would be visible
        let mut spline = Spline::new(
            to_rows(&[(0.0, 0.0), (0.5, 1.0), (1.0, 2.0)]),
            vec![vec![9.0; 4]; 2],
        )
        .unwrap();
        let before = spline.clone();
        spline.apply_grad(0.1);
        assert_eq!(spline, before);
        assert!(spline.gradients().iter().all(|g| *g == 0.0));
    }

    #[test]
    fn test_apply_never_moves_last_point() {
        let mut spline = linear_spline();
        for x in [0.1, 0.3, 0.5, 0.7, 0.9, 1.0] {
            spline.backward(x, 1.0, 0.0).unwrap();
        }
        spline.apply_grad(0.1);
        let points = spline.get_points();
        assert_eq!(points[5].y, 5.0);
        assert!(points[..5].iter().zip(linear_spline().get_points()).all(|(p, old)| p.y < old.y));
    }

    #[test]
    fn test_zero_gradients() {
        let mut spline = linear_spline();
        spline.backward(0.3, 1.0, 0.0).unwrap();
        spline.zero_gradients();
        assert!(spline.gradients().iter().all(|g| *g == 0.0));
        spline.apply_grad(1.0);
        assert_eq!(spline, linear_spline());
    }

    #[test]
    fn test_set_point_height() {
        let mut spline = linear_spline();
        spline.set_point_height(5, 10.0).unwrap();
        assert_almost_eq!(spline.forward(1.0).unwrap(), 10.0, 1e-9);
        assert_eq!(
            spline.set_point_height(6, 0.0).unwrap_err(),
            SplineError::PointIndexOutOfRange { index: 6, len: 6 }
        );
    }

    #[test]
    fn test_counts() {
        let spline = linear_spline();
        assert_eq!(spline.domain(), (0.0, 1.0));
        assert_eq!(spline.parameter_count(), 2 * 6 + 4 * 5);
        assert_eq!(spline.trainable_parameter_count(), 5);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut spline = linear_spline();
        spline.backward(0.3, 1.0, 0.0).unwrap();
        let mut bytes = Vec::new();
        ciborium::into_writer(&spline, &mut bytes).unwrap();
        let restored: Spline = ciborium::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(restored, spline);
        assert!(restored.gradients().iter().all(|g| *g == 0.0));
    }

    #[test]
    fn test_deserialize_rejects_bad_payload() {
        let json = r#"{"points":[[0.0,0.0]],"params":[]}"#;
        let restored: Result<Spline, _> = serde_json::from_str(json);
        assert!(restored.is_err());
    }

    #[test]
    fn test_spline_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Spline>();
    }

    #[test]
    fn test_spline_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<Spline>();
    }
}

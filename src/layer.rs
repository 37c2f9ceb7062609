pub mod layer_errors;
pub mod spline;

use crate::activation::Activation;
use crate::execution::ExecutionMode;
use layer_errors::*;
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use spline::{spline_errors::SplineError, Spline};

use std::sync::Arc;

/// learning rate of a freshly built layer
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;

/// A dense grid of cubic splines, one per (input, output) pair.
///
/// Output `j` of the layer is the sum, over every input `i`, of the spline connecting `i` to `j` evaluated at `x[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LayerRecord")]
pub struct Layer {
    /// the splines feeding output 0 come first, then those feeding output 1, and so on.
    /// The spline connecting input `i` to output `j` is at `j * input_dimension + i`
    splines: Vec<Spline>,
    input_dimension: usize,
    output_dimension: usize,
    learning_rate: f64,
    /// the output of the most recent call to [`Layer::forward`], read back by the [`Network`](crate::network::Network) during backward
    #[serde(skip)] // part of the layer's operating state, not part of the model
    last_output: Option<Vec<f64>>,
    #[serde(skip)]
    activation: Option<Arc<dyn Activation>>,
}

/// the stored form of a [`Layer`], checked against the construction rules before it becomes one
#[derive(Deserialize)]
struct LayerRecord {
    splines: Vec<Spline>,
    input_dimension: usize,
    output_dimension: usize,
    learning_rate: f64,
}

/// the residual each spline produced for one sample, held back until it's safe to write into the accumulators
#[derive(Debug)]
struct SampleGradient {
    /// `(segment, residual)` per spline, in spline order
    residuals: Vec<(usize, f64)>,
    input_gradient: Vec<f64>,
}

impl Layer {
    /// Create a layer of `input_dimension * output_dimension` flat splines.
    ///
    /// Every spline gets `detail + 2` control points evenly spaced over `[0, max]` at height 0, and zeroed segment parameters.
    /// Call [`Layer::interpolate_splines`] once the control points are where you want them.
    ///
    /// # Errors
    /// Returns a [`LayerBuildError`] if either dimension is 0, if `max` is not a finite positive number, or if the layer is too large to address
    ///
    /// # Examples
    /// ```
    /// use splinenet::layer::Layer;
    /// let mut layer = Layer::new(2, 3, 4, 1.0)?;
    /// layer.interpolate_splines();
    /// assert_eq!(layer.total_splines(), 6);
    /// assert_eq!(layer.forward(&[0.2, 0.9], false)?, vec![0.0; 3]);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(
        input_dimension: usize,
        output_dimension: usize,
        detail: usize,
        max: f64,
    ) -> Result<Self, LayerBuildError> {
        if input_dimension == 0 || output_dimension == 0 {
            return Err(LayerBuildError::ZeroDimension {
                input_dimension,
                output_dimension,
            });
        }
        if !(max.is_finite() && max > 0.0) {
            return Err(LayerBuildError::InvalidDomain { max });
        }
        let oversized = || LayerBuildError::Oversized {
            input_dimension,
            output_dimension,
            detail,
        };
        let spline_count = input_dimension
            .checked_mul(output_dimension)
            .ok_or_else(oversized)?;
        // every spline carries `detail + 2` control points
        if detail.checked_add(2).is_none() {
            return Err(oversized());
        }
        let splines = (0..spline_count)
            .map(|idx| {
                Spline::uniform(detail, max).map_err(|source| LayerBuildError::Spline {
                    input: idx % input_dimension,
                    output: idx / input_dimension,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Layer::from_splines(splines, input_dimension, output_dimension))
    }

    /// Rebuild a layer from the nested form produced by [`Layer::points_grid`] and [`Layer::params_grid`].
    ///
    /// `points_grid[i][j]` holds the `[x, y]` control points of the spline from input `i` to output `j`,
    /// and `params_grid[i][j]` its `[a, b, c, d]` segment parameters. Every cell must have the same number of control points.
    ///
    /// # Errors
    /// Returns [`LayerBuildError::DimensionMismatch`] if the two grids disagree on their shape, or [`LayerBuildError::Spline`] if a cell is not a valid spline
    ///
    /// # Examples
    /// ```
    /// use splinenet::layer::Layer;
    /// let points = vec![vec![vec![vec![0.0, 1.0], vec![1.0, 3.0]]]];
    /// let params = vec![vec![vec![vec![0.0; 4]]]];
    /// let mut layer = Layer::from_data(&points, &params)?;
    /// layer.interpolate_splines();
    /// assert!((layer.forward(&[0.5], false)?[0] - 2.0).abs() < 1e-9);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_data(
        points_grid: &[Vec<Vec<Vec<f64>>>],
        params_grid: &[Vec<Vec<Vec<f64>>>],
    ) -> Result<Self, LayerBuildError> {
        let input_dimension = points_grid.len();
        if params_grid.len() != input_dimension {
            return Err(LayerBuildError::DimensionMismatch {
                dimension: GridDimension::Input,
                expected: input_dimension,
                actual: params_grid.len(),
            });
        }
        let output_dimension = points_grid.first().map_or(0, Vec::len);
        if input_dimension == 0 || output_dimension == 0 {
            return Err(LayerBuildError::ZeroDimension {
                input_dimension,
                output_dimension,
            });
        }
        let point_count = points_grid[0][0].len();
        for (points_row, params_row) in points_grid.iter().zip(params_grid) {
            for row in [points_row, params_row] {
                if row.len() != output_dimension {
                    return Err(LayerBuildError::DimensionMismatch {
                        dimension: GridDimension::Output,
                        expected: output_dimension,
                        actual: row.len(),
                    });
                }
            }
            for (points, params) in points_row.iter().zip(params_row) {
                if points.len() != point_count {
                    return Err(LayerBuildError::DimensionMismatch {
                        dimension: GridDimension::Points,
                        expected: point_count,
                        actual: points.len(),
                    });
                }
                if params.len() != point_count.saturating_sub(1) {
                    return Err(LayerBuildError::DimensionMismatch {
                        dimension: GridDimension::Segments,
                        expected: point_count.saturating_sub(1),
                        actual: params.len(),
                    });
                }
            }
        }

        let mut splines = Vec::with_capacity(input_dimension * output_dimension);
        for output in 0..output_dimension {
            for input in 0..input_dimension {
                let spline = Spline::new(
                    points_grid[input][output].clone(),
                    params_grid[input][output].clone(),
                )
                .map_err(|source| LayerBuildError::Spline {
                    input,
                    output,
                    source,
                })?;
                splines.push(spline);
            }
        }
        Ok(Layer::from_splines(splines, input_dimension, output_dimension))
    }

    fn from_splines(splines: Vec<Spline>, input_dimension: usize, output_dimension: usize) -> Self {
        Layer {
            splines,
            input_dimension,
            output_dimension,
            learning_rate: DEFAULT_LEARNING_RATE,
            last_output: None,
            activation: None,
        }
    }

    /// attach an activation, applied element-wise to every output of this layer
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use splinenet::activation::StandardActivation;
    /// use splinenet::layer::Layer;
    /// let layer = Layer::new(2, 2, 3, 1.0)?.with_activation(Arc::new(StandardActivation::Tanh));
    /// # Ok::<(), splinenet::layer::layer_errors::LayerBuildError>(())
    /// ```
    pub fn with_activation(mut self, activation: Arc<dyn Activation>) -> Self {
        self.activation = Some(activation);
        self
    }

    /// re-solve the interpolation of every spline in the layer
    pub fn interpolate_splines(&mut self) {
        self.splines.iter_mut().for_each(Spline::interpolation);
    }

    /// Calculate the output of this layer for the input vector `x` and remember it as [`Layer::last_output`].
    ///
    /// When `normalize` is set, every output is divided by the largest one, unless that largest output is 0.
    /// This is a rescaling heuristic, not a statistical normalization. The activation, if any, is applied after normalizing.
    ///
    /// # Errors
    /// Returns a [`ForwardLayerError`] if `x` is not `input_dimension` long, or if an input lies outside the domain of a spline reading it.
    /// On error the cached output is left as it was
    pub fn forward(&mut self, x: &[f64], normalize: bool) -> Result<Vec<f64>, ForwardLayerError> {
        let output = self.infer(x, normalize)?;
        self.last_output = Some(output.clone());
        Ok(output)
    }

    /// as [`Layer::forward`], but does not touch the cached output
    pub fn infer(&self, x: &[f64], normalize: bool) -> Result<Vec<f64>, ForwardLayerError> {
        if x.len() != self.input_dimension {
            return Err(ForwardLayerError::MissizedInput {
                actual: x.len(),
                expected: self.input_dimension,
            });
        }
        let mut output = vec![0.0; self.output_dimension];
        for (idx, spline) in self.splines.iter().enumerate() {
            let (input, out) = (idx % self.input_dimension, idx / self.input_dimension);
            output[out] += spline
                .forward(x[input])
                .map_err(|source| ForwardLayerError::Spline {
                    input,
                    output: out,
                    source,
                })?;
        }
        if normalize {
            let max = output.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max != 0.0 {
                output.iter_mut().for_each(|value| *value /= max);
            }
        }
        if let Some(activation) = &self.activation {
            output
                .iter_mut()
                .for_each(|value| *value = activation.forward(*value));
        }
        Ok(output)
    }

    /// Run [`Layer::forward`] over every row of `batch`. Rows are independent, so [`ExecutionMode::Concurrent`] evaluates them in parallel.
    ///
    /// Afterwards [`Layer::last_output`] holds the output of the last row.
    ///
    /// # Errors
    /// Returns [`ForwardLayerError::BatchSample`] wrapping the failure of the first failing row.
    /// A failed concurrent batch leaves the cached output untouched
    pub fn forward_batch(
        &mut self,
        batch: &[Vec<f64>],
        normalize: bool,
        mode: &ExecutionMode,
    ) -> Result<Vec<Vec<f64>>, ForwardLayerError> {
        let outputs = match mode {
            ExecutionMode::Sequential => batch
                .iter()
                .enumerate()
                .map(|(sample, row)| {
                    self.forward(row, normalize)
                        .map_err(|e| ForwardLayerError::BatchSample {
                            sample,
                            source: Box::new(e),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            ExecutionMode::Concurrent(thread_pool) => {
                let results: Vec<Result<Vec<f64>, ForwardLayerError>> = thread_pool.install(|| {
                    batch
                        .par_iter()
                        .map(|row| self.infer(row, normalize))
                        .collect()
                });
                let outputs = results
                    .into_iter()
                    .enumerate()
                    .map(|(sample, result)| {
                        result.map_err(|e| ForwardLayerError::BatchSample {
                            sample,
                            source: Box::new(e),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(last) = outputs.last() {
                    self.last_output = Some(last.clone());
                }
                outputs
            }
        };
        Ok(outputs)
    }

    /// Distribute the output gradient `d_y` across the splines of this layer and return the gradient for each input.
    ///
    /// Each connection gets the share of `d_y[j]` matching its share of the (unnormalized) sum at output `j`.
    /// If that sum is exactly 0, every connection feeding `j` gets all of `d_y[j]`.
    /// The share is passed through the activation's backward, if there is one, then handed to the spline, whose residual is accumulated and added to the gradient of its input.
    ///
    /// When `apply` is set, the accumulated gradients are applied with this layer's learning rate before returning.
    ///
    /// # Errors
    /// Returns a [`BackwardLayerError`] if `x` or `d_y` has the wrong length, or an input lies outside a spline's domain.
    /// On error no accumulator is touched
    ///
    /// # Examples
    /// ```
    /// use splinenet::layer::Layer;
    /// let mut layer = Layer::new(2, 3, 4, 1.0)?;
    /// layer.interpolate_splines();
    /// // every spline is flat at 0, so every connection takes the whole gradient of its output
    /// let input_gradient = layer.backward(&[0.5, 0.5], &[1.0, 2.0, 3.0], false)?;
    /// assert_eq!(input_gradient, vec![6.0, 6.0]);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn backward(
        &mut self,
        x: &[f64],
        d_y: &[f64],
        apply: bool,
    ) -> Result<Vec<f64>, BackwardLayerError> {
        let gradient = self.sample_gradient(x, d_y)?;
        self.commit(&gradient);
        if apply {
            self.apply_gradients();
        }
        Ok(gradient.input_gradient)
    }

    /// compute everything [`Layer::backward`] would write, without writing it
    fn sample_gradient(&self, x: &[f64], d_y: &[f64]) -> Result<SampleGradient, BackwardLayerError> {
        if x.len() != self.input_dimension {
            return Err(BackwardLayerError::MissizedInput {
                actual: x.len(),
                expected: self.input_dimension,
            });
        }
        if d_y.len() != self.output_dimension {
            return Err(BackwardLayerError::MissizedGradient {
                actual: d_y.len(),
                expected: self.output_dimension,
            });
        }
        let spline_error = |idx: usize, source: SplineError| BackwardLayerError::Spline {
            input: idx % self.input_dimension,
            output: idx / self.input_dimension,
            source,
        };

        // the cached output can't be reused here, we need every connection's value before summing
        let spline_outputs = self
            .splines
            .iter()
            .enumerate()
            .map(|(idx, spline)| {
                spline
                    .forward(x[idx % self.input_dimension])
                    .map_err(|e| spline_error(idx, e))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        let mut totals = vec![0.0; self.output_dimension];
        for (idx, value) in spline_outputs.iter().enumerate() {
            totals[idx / self.input_dimension] += value;
        }

        let mut residuals = Vec::with_capacity(self.splines.len());
        let mut input_gradient = vec![0.0; self.input_dimension];
        for (idx, spline) in self.splines.iter().enumerate() {
            let (input, output) = (idx % self.input_dimension, idx / self.input_dimension);
            let spline_output = spline_outputs[idx];
            let ratio = if totals[output] != 0.0 {
                spline_output / totals[output]
            } else {
                1.0
            };
            let mut adjusted = d_y[output] * ratio;
            if let Some(activation) = &self.activation {
                adjusted = activation.backward(spline_output, adjusted);
            }
            let (segment, residual) = spline
                .residual(x[input], adjusted, spline_output)
                .map_err(|e| spline_error(idx, e))?;
            residuals.push((segment, residual));
            input_gradient[input] += residual;
        }
        Ok(SampleGradient {
            residuals,
            input_gradient,
        })
    }

    fn commit(&mut self, gradient: &SampleGradient) {
        for (spline, &(segment, residual)) in self.splines.iter_mut().zip(&gradient.residuals) {
            spline.accumulate_gradient(segment, residual);
        }
    }

    /// Run [`Layer::backward`] for every `(x_batch[b], d_y_batch[b])` pair and return the input gradient of each sample.
    ///
    /// With [`ExecutionMode::Sequential`], the gradients of each sample are applied before the next sample is processed.
    ///
    /// With [`ExecutionMode::Concurrent`], samples are processed in parallel against the layer as it was when the call started.
    /// Once every sample is done, their gradients are accumulated in sample order and applied once, as a single mini-batch step.
    ///
    /// Either way, gradients still pending from earlier `backward(.., apply = false)` calls are applied along with the batch.
    /// Call [`Layer::zero_gradients`] first to discard them instead. An empty batch changes nothing.
    ///
    /// # Errors
    /// Returns [`BackwardLayerError::MismatchedBatch`] if the batches differ in length, or [`BackwardLayerError::BatchSample`] wrapping the failure of the first failing sample.
    /// In sequential mode, samples before the failing one have already been applied. In concurrent mode, a failure leaves every spline untouched
    pub fn backward_batch(
        &mut self,
        x_batch: &[Vec<f64>],
        d_y_batch: &[Vec<f64>],
        mode: &ExecutionMode,
    ) -> Result<Vec<Vec<f64>>, BackwardLayerError> {
        if x_batch.len() != d_y_batch.len() {
            return Err(BackwardLayerError::MismatchedBatch {
                inputs: x_batch.len(),
                gradients: d_y_batch.len(),
            });
        }
        if x_batch.is_empty() {
            return Ok(Vec::new());
        }
        match mode {
            ExecutionMode::Sequential => x_batch
                .iter()
                .zip(d_y_batch)
                .enumerate()
                .map(|(sample, (x, d_y))| {
                    self.backward(x, d_y, true)
                        .map_err(|e| BackwardLayerError::BatchSample {
                            sample,
                            source: Box::new(e),
                        })
                })
                .collect(),
            ExecutionMode::Concurrent(thread_pool) => {
                debug!(
                    "spreading {} samples across {} workers",
                    x_batch.len(),
                    mode.worker_count(x_batch.len())
                );
                let results: Vec<Result<SampleGradient, BackwardLayerError>> =
                    thread_pool.install(|| {
                        x_batch
                            .par_iter()
                            .zip(d_y_batch.par_iter())
                            .map(|(x, d_y)| self.sample_gradient(x, d_y))
                            .collect()
                    });

                let failures = results.iter().filter(|result| result.is_err()).count();
                if failures > 0 {
                    debug!(
                        "{} of {} samples failed, discarding the batch",
                        failures,
                        results.len()
                    );
                }
                let gradients = results
                    .into_iter()
                    .enumerate()
                    .map(|(sample, result)| {
                        result.map_err(|e| BackwardLayerError::BatchSample {
                            sample,
                            source: Box::new(e),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                debug!("committing gradients of {} samples", gradients.len());
                for gradient in gradients.iter() {
                    self.commit(gradient);
                }
                self.apply_gradients();
                Ok(gradients
                    .into_iter()
                    .map(|gradient| gradient.input_gradient)
                    .collect())
            }
        }
    }

    /// apply the gradients accumulated by every spline, using this layer's learning rate, and clear them
    pub fn apply_gradients(&mut self) {
        trace!("applying gradients with learning rate {}", self.learning_rate);
        let learning_rate = self.learning_rate;
        for spline in self.splines.iter_mut() {
            spline.apply_grad(learning_rate);
        }
    }

    /// clear the gradients accumulated by every spline without applying them
    pub fn zero_gradients(&mut self) {
        self.splines.iter_mut().for_each(Spline::zero_gradients);
    }

    /// the step size used when applying gradients. Defaults to [`DEFAULT_LEARNING_RATE`]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    #[allow(missing_docs)]
    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// the output of the most recent [`Layer::forward`] call, or `None` if forward has never been called
    pub fn last_output(&self) -> Option<&[f64]> {
        self.last_output.as_deref()
    }

    #[allow(missing_docs)]
    pub fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    #[allow(missing_docs)]
    pub fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    /// the spline connecting `input` to `output`, if both are in range
    pub fn spline(&self, input: usize, output: usize) -> Option<&Spline> {
        if input >= self.input_dimension || output >= self.output_dimension {
            return None;
        }
        self.splines.get(output * self.input_dimension + input)
    }

    /// the control points of every spline as `[input][output][point] = [x, y]`, the layout [`Layer::from_data`] accepts
    pub fn points_grid(&self) -> Vec<Vec<Vec<Vec<f64>>>> {
        self.grid(|spline| {
            spline
                .get_points()
                .iter()
                .map(|point| vec![point.x, point.y])
                .collect()
        })
    }

    /// the segment parameters of every spline as `[input][output][segment] = [a, b, c, d]`, the layout [`Layer::from_data`] accepts
    pub fn params_grid(&self) -> Vec<Vec<Vec<Vec<f64>>>> {
        self.grid(|spline| {
            spline
                .get_params()
                .iter()
                .map(|s| vec![s.a, s.b, s.c, s.d])
                .collect()
        })
    }

    fn grid<F>(&self, cell: F) -> Vec<Vec<Vec<Vec<f64>>>>
    where
        F: Fn(&Spline) -> Vec<Vec<f64>>,
    {
        (0..self.input_dimension)
            .map(|input| {
                (0..self.output_dimension)
                    .map(|output| cell(&self.splines[output * self.input_dimension + input]))
                    .collect()
            })
            .collect()
    }

    /// the number of splines in this layer, `input_dimension * output_dimension`
    pub fn total_splines(&self) -> usize {
        self.splines.len()
    }

    /// the total number of stored values across every spline. See [`Spline::parameter_count`]
    pub fn parameter_count(&self) -> usize {
        self.splines.iter().map(Spline::parameter_count).sum()
    }

    /// the number of control point heights gradient descent can move. See [`Spline::trainable_parameter_count`]
    pub fn trainable_parameter_count(&self) -> usize {
        self.splines.iter().map(Spline::trainable_parameter_count).sum()
    }
}

impl TryFrom<LayerRecord> for Layer {
    type Error = LayerBuildError;

    fn try_from(record: LayerRecord) -> Result<Self, Self::Error> {
        let LayerRecord {
            splines,
            input_dimension,
            output_dimension,
            learning_rate,
        } = record;
        if input_dimension == 0 || output_dimension == 0 {
            return Err(LayerBuildError::ZeroDimension {
                input_dimension,
                output_dimension,
            });
        }
        if input_dimension.checked_mul(output_dimension) != Some(splines.len()) {
            return Err(LayerBuildError::SplineCount {
                input_dimension,
                output_dimension,
                actual: splines.len(),
            });
        }
        // every spline in a layer shares one detail
        let segment_count = splines.first().map_or(0, Spline::segment_count);
        if let Some(spline) = splines
            .iter()
            .find(|spline| spline.segment_count() != segment_count)
        {
            return Err(LayerBuildError::DimensionMismatch {
                dimension: GridDimension::Segments,
                expected: segment_count,
                actual: spline.segment_count(),
            });
        }
        let mut layer = Layer::from_splines(splines, input_dimension, output_dimension);
        layer.learning_rate = learning_rate;
        Ok(layer)
    }
}

impl PartialEq for Layer {
    // don't compare the cached output or the activation
    fn eq(&self, other: &Self) -> bool {
        self.splines == other.splines
            && self.input_dimension == other.input_dimension
            && self.output_dimension == other.output_dimension
            && self.learning_rate == other.learning_rate
    }
}

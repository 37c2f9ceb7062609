pub mod network_errors;

use crate::layer::Layer;
use log::debug;
use network_errors::NetworkError;
use serde::{Deserialize, Serialize};

/// An ordered chain of [`Layer`]s, each feeding its output to the next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NetworkRecord")]
pub struct Network {
    layers: Vec<Layer>,
}

#[derive(Deserialize)]
struct NetworkRecord {
    layers: Vec<Layer>,
}

impl TryFrom<NetworkRecord> for Network {
    type Error = NetworkError;

    fn try_from(record: NetworkRecord) -> Result<Self, Self::Error> {
        Network::from_layers(record.layers)
    }
}

impl Network {
    /// Build `layer_count` fresh layers, where layer `k` has `in_sizes[k]` inputs, `out_sizes[k]` outputs, and splines with `details[k]` interior control points over `[0, maxes[k]]`.
    ///
    /// Like [`Layer::new`], the splines start flat. Call [`Network::interpolate_splines`] before use.
    ///
    /// # Errors
    /// Returns a [`NetworkError`] if there are no layers, an argument slice isn't `layer_count` long, a layer's input size doesn't match the previous layer's output size,
    /// or a layer can't be built
    ///
    /// # Examples
    /// ```
    /// use splinenet::network::Network;
    /// let mut network = Network::new(2, &[2, 3], &[3, 1], &[4, 4], &[1.0, 1.0])?;
    /// network.interpolate_splines();
    /// let output = network.forward(&[0.2, 0.4], true)?;
    /// assert_eq!(output.len(), 1);
    /// # Ok::<(), splinenet::network::network_errors::NetworkError>(())
    /// ```
    pub fn new(
        layer_count: usize,
        in_sizes: &[usize],
        out_sizes: &[usize],
        details: &[usize],
        maxes: &[f64],
    ) -> Result<Self, NetworkError> {
        for (argument, actual) in [
            ("in_sizes", in_sizes.len()),
            ("out_sizes", out_sizes.len()),
            ("details", details.len()),
            ("maxes", maxes.len()),
        ] {
            if actual != layer_count {
                return Err(NetworkError::MismatchedSpecLength {
                    argument,
                    expected: layer_count,
                    actual,
                });
            }
        }
        let layers = (0..layer_count)
            .map(|k| {
                Layer::new(in_sizes[k], out_sizes[k], details[k], maxes[k])
                    .map_err(|source| NetworkError::Build { layer: k, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Network::from_layers(layers)
    }

    /// Chain existing layers into a network, for instance layers restored with [`Layer::from_data`]
    ///
    /// # Errors
    /// Returns a [`NetworkError`] if `layers` is empty or a layer's input dimension doesn't match the previous layer's output dimension
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self, NetworkError> {
        if layers.is_empty() {
            return Err(NetworkError::NoLayers);
        }
        for (k, pair) in layers.windows(2).enumerate() {
            if pair[1].input_dimension() != pair[0].output_dimension() {
                return Err(NetworkError::MismatchedLayerChain {
                    layer: k + 1,
                    expected: pair[1].input_dimension(),
                    actual: pair[0].output_dimension(),
                });
            }
        }
        Ok(Network { layers })
    }

    /// re-solve the interpolation of every spline in every layer
    pub fn interpolate_splines(&mut self) {
        self.layers.iter_mut().for_each(Layer::interpolate_splines);
    }

    /// Feed `x` through every layer in order and return the output of the last one.
    ///
    /// `normalize` applies to every layer but the last, whose output is never normalized. Each layer caches its output for [`Network::backward`].
    ///
    /// # Errors
    /// Returns [`NetworkError::Forward`] naming the first layer to fail
    pub fn forward(&mut self, x: &[f64], normalize: bool) -> Result<Vec<f64>, NetworkError> {
        let last = self.layers.len().saturating_sub(1);
        let mut activations = x.to_vec();
        for (k, layer) in self.layers.iter_mut().enumerate() {
            activations = layer
                .forward(&activations, normalize && k != last)
                .map_err(|source| NetworkError::Forward { layer: k, source })?;
        }
        Ok(activations)
    }

    /// as [`Network::forward`], but leaves every layer's cached output untouched
    pub fn infer(&self, x: &[f64], normalize: bool) -> Result<Vec<f64>, NetworkError> {
        let last = self.layers.len().saturating_sub(1);
        let mut activations = x.to_vec();
        for (k, layer) in self.layers.iter().enumerate() {
            activations = layer
                .infer(&activations, normalize && k != last)
                .map_err(|source| NetworkError::Forward { layer: k, source })?;
        }
        Ok(activations)
    }

    /// Backpropagate `d_y` from the last layer to the first, applying each layer's gradients as soon as that layer is done.
    ///
    /// `x` must be the input of the matching [`Network::forward`] call. Every other layer replays the output its predecessor cached during that call.
    /// Returns the gradient with respect to `x`.
    ///
    /// # Errors
    /// Returns [`NetworkError::BackwardBeforeForward`] if a layer other than the first has no cached input, checked before any layer is touched,
    /// or [`NetworkError::Backward`] naming the first layer to fail
    ///
    /// # Examples
    /// ```
    /// use splinenet::network::Network;
    /// let mut network = Network::new(2, &[2, 3], &[3, 2], &[4, 4], &[1.0, 1.0])?;
    /// network.interpolate_splines();
    /// let x = [0.5, 0.5];
    /// let _ = network.forward(&x, true)?;
    /// let input_gradient = network.backward(&x, &[1.0, 2.0])?;
    /// assert_eq!(input_gradient.len(), 2);
    /// # Ok::<(), splinenet::network::network_errors::NetworkError>(())
    /// ```
    pub fn backward(&mut self, x: &[f64], d_y: &[f64]) -> Result<Vec<f64>, NetworkError> {
        self.backward_pass(x, d_y, true)
    }

    /// as [`Network::backward`], but only accumulates gradients. Apply them later with [`Network::apply_gradients`]
    pub fn accumulate_gradients(&mut self, x: &[f64], d_y: &[f64]) -> Result<Vec<f64>, NetworkError> {
        self.backward_pass(x, d_y, false)
    }

    fn backward_pass(&mut self, x: &[f64], d_y: &[f64], apply: bool) -> Result<Vec<f64>, NetworkError> {
        if let Some(k) = (1..self.layers.len()).find(|&k| self.layers[k - 1].last_output().is_none()) {
            return Err(NetworkError::BackwardBeforeForward { layer: k });
        }
        let mut gradient = d_y.to_vec();
        for k in (0..self.layers.len()).rev() {
            let (earlier, rest) = self.layers.split_at_mut(k);
            let input = match earlier.last() {
                Some(previous) => previous
                    .last_output()
                    .ok_or(NetworkError::BackwardBeforeForward { layer: k })?,
                None => x,
            };
            gradient = rest[0]
                .backward(input, &gradient, apply)
                .map_err(|source| NetworkError::Backward { layer: k, source })?;
        }
        Ok(gradient)
    }

    /// apply the gradients accumulated in every layer, each with its own learning rate
    pub fn apply_gradients(&mut self) {
        debug!("applying gradients across {} layers", self.layers.len());
        self.layers.iter_mut().for_each(Layer::apply_gradients);
    }

    /// clear the gradients accumulated in every layer without applying them
    pub fn zero_gradients(&mut self) {
        self.layers.iter_mut().for_each(Layer::zero_gradients);
    }

    /// set the learning rate of every layer
    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        for layer in self.layers.iter_mut() {
            layer.set_learning_rate(learning_rate);
        }
    }

    #[allow(missing_docs)]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[allow(missing_docs)]
    pub fn layer(&self, k: usize) -> Option<&Layer> {
        self.layers.get(k)
    }

    #[allow(missing_docs)]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// the input dimension of the first layer
    pub fn input_dimension(&self) -> usize {
        self.layers.first().map_or(0, Layer::input_dimension)
    }

    /// the output dimension of the last layer
    pub fn output_dimension(&self) -> usize {
        self.layers.last().map_or(0, Layer::output_dimension)
    }

    /// returns the total number of stored values in the model, including those gradient descent can't change
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// returns the total number of control point heights gradient descent can move
    pub fn trainable_parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::trainable_parameter_count).sum()
    }
}

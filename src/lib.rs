#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! A library to build and train networks of natural cubic splines.
//!
//! The `splinenet` crate replaces every weight of a dense layer with a learned one-dimensional function: the connection from input `i` to output `j`
//! is a [natural cubic spline](https://en.wikipedia.org/wiki/Spline_interpolation) over a fixed set of control points, and output `j` is the sum of every spline feeding it.
//!
//! The [layer::spline] module contains [`layer::spline::Spline`], which solves the interpolation through its control points, evaluates it, and reshapes itself from accumulated gradients.
//!
//! The [layer] module contains [`layer::Layer`], a grid of splines that shares an output gradient among its connections in proportion to how much each one contributed to the output.
//!
//! The [network] module contains [`network::Network`], which chains layers together.
//!
//! # Examples
//! Build, train and save a single-layer network with a 1-dimensional input and 1 output,
//! where the spline has 8 interior control points over `[0, 2]`:
//! ```
//! use splinenet::network::Network;
//! use splinenet::{Sample, training_options::TrainingOptions, EachEpoch};
//! use tempfile::tempfile;
//!
//! // initialize the model
//! let mut untrained_model = Network::new(1, &[1], &[1], &[8], &[2.0])?;
//! untrained_model.interpolate_splines();
//!
//! // train the model
//! let training_data: Vec<Sample> = Vec::new();
//! /* Load training data */
//! # let training_data = vec![Sample::new(vec![0.5], vec![1.0]), Sample::new(vec![1.5], vec![3.0])];
//!
//! let options = TrainingOptions { num_epochs: 5, ..TrainingOptions::default() };
//! let trained_model = splinenet::train_model(untrained_model, &training_data, EachEpoch::DoNotValidateModel, &splinenet::EmptyObserver::new(), options)?;
//!
//! // save the model
//! // Network, Layer and Spline all implement the serde Serialize trait, so they can be saved to a file using any serde-compatible format
//! // here we use the ciborium crate to save the model in the CBOR format
//! let mut file = tempfile()?;
//! ciborium::into_writer(&trained_model, &mut file)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Contains the [`Activation`](crate::activation::Activation) trait a [`Layer`](crate::layer::Layer) can apply to its outputs, and common implementations of it.
pub mod activation;
/// Contains [`ExecutionMode`](crate::execution::ExecutionMode), which selects how batched layer operations are scheduled.
pub mod execution;
/// Contains the struct [`Layer`](crate::layer::Layer), a grid of splines connecting every input to every output.
pub mod layer;
/// Contains the struct [`Network`](crate::network::Network), an ordered chain of layers.
pub mod network;
/// Provides a trait for observing the training process during [`crate::train_model`].
pub mod training_observer;
/// Options for training a model with [`crate::train_model`].
pub mod training_options;

mod training_error;

pub use training_error::TrainingError;

use log::{info, warn};
use network::{network_errors::NetworkError, Network};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use shuffle::{fy, shuffler::Shuffler};
use training_observer::TrainingObserver;
use training_options::TrainingOptions;

/// A sample of data to be used in training a model.
///
/// Used for both [training](train_model) and [validation](validate_model) data.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Sample {
    /// The input data for the model
    features: Vec<f64>,
    /// The expected output of the model, one value per output unit
    labels: Vec<f64>,
}

impl Sample {
    /// Create a new Sample
    pub fn new(features: Vec<f64>, labels: Vec<f64>) -> Self {
        Sample { features, labels }
    }

    /// Get the features of the sample
    pub fn features(&self) -> &[f64] {
        &self.features
    }
    /// Get the labels of the sample
    pub fn labels(&self) -> &[f64] {
        &self.labels
    }
}

/// Train the provided model with the provided data, using plain gradient descent on the squared error `½·Σ(output - label)²`.
///
/// Before training starts, every layer's learning rate is set to `options.learning_rate`.
/// Each sample is run forward, and the gradient of its loss is accumulated through [`Network::accumulate_gradients`].
/// The accumulated gradients are applied every `options.batch_size` samples, and at the end of each epoch.
///
/// if `validate` is [`EachEpoch::ValidateModel`], the model will be validated after each epoch, and the validation loss will be reported to the observer, otherwise the reported validation loss will be NaN.
///
/// Returns the trained model if no errors are thrown.
///
/// # Errors
/// returns a [TrainingError] if the model reports an error at any point during training, or a sample's labels don't match the model's output dimension.
///
/// # Example
/// train a model, using the provided [EmptyObserver] to ignore all training events:
/// ```
/// use splinenet::{train_model, Sample, training_options::TrainingOptions, EmptyObserver, EachEpoch};
/// use splinenet::network::Network;
/// # use splinenet::TrainingError;
///
/// # let mut untrained_model = Network::new(1, &[2], &[1], &[4], &[1.0]).unwrap();
/// # untrained_model.interpolate_splines();
/// let mut training_data: Vec<Sample> = Vec::new();
///
/// /* Load training data */
/// # training_data.push(Sample::new(vec![0.2, 0.4], vec![0.6]));
///
/// let trained_model = train_model(
///     untrained_model,
///     &training_data,
///     EachEpoch::DoNotValidateModel,
///     &EmptyObserver::new(),
///     TrainingOptions::default())?;
/// # Ok::<(), TrainingError>(())
/// ```
pub fn train_model<T: TrainingObserver>(
    mut model: Network,
    training_data: &[Sample],
    validate: EachEpoch,
    training_observer: &T,
    options: TrainingOptions,
) -> Result<Network, TrainingError> {
    model.set_learning_rate(options.learning_rate);
    model.zero_gradients();
    let batch_size = options.batch_size.max(1);

    let mut randomness = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut fys = fy::FisherYates::default();

    for epoch in 1..=options.num_epochs {
        let mut epoch_loss = 0.0;
        let mut pending = 0;
        let mut ordered_samples: Vec<&Sample> = training_data.iter().collect();
        if options.shuffle {
            if let Err(e) = fys.shuffle(&mut ordered_samples, &mut randomness) {
                warn!("unable to shuffle training data, keeping the original order: {}", e);
            }
        }

        for (sample_idx, sample) in ordered_samples.into_iter().enumerate() {
            let training_error = |source: NetworkError| TrainingError {
                source,
                epoch,
                sample: sample_idx,
            };
            let output = model
                .forward(sample.features(), options.normalize_hidden)
                .map_err(training_error)?;
            let (loss, d_y) =
                calculate_squared_error_and_gradient(&output, sample.labels()).map_err(training_error)?;
            epoch_loss += loss;
            model
                .accumulate_gradients(sample.features(), &d_y)
                .map_err(training_error)?;
            pending += 1;
            if pending == batch_size {
                model.apply_gradients();
                pending = 0;
            }
            training_observer.on_sample_end();
        }
        if pending > 0 {
            model.apply_gradients();
        }

        epoch_loss /= training_data.len().max(1) as f64;
        let validation_loss = match validate {
            EachEpoch::ValidateModel(validation_data) => validate_model(
                validation_data,
                &model,
                options.normalize_hidden,
                training_observer,
            )
            .map_err(|source| TrainingError {
                source,
                epoch,
                sample: training_data.len(),
            })?,
            EachEpoch::DoNotValidateModel => f64::NAN,
        };
        info!(
            "epoch {} training loss {} validation loss {}",
            epoch, epoch_loss, validation_loss
        );
        // notify the observer that the epoch has ended
        training_observer.on_epoch_end(epoch, epoch_loss, validation_loss);
    }

    Ok(model)
}

/// Calculates the mean squared error loss of the model on the provided validation data, without changing the model.
///
/// Calls the [`TrainingObserver::on_sample_end`] method of the provided observer after each sample is processed.
///
/// # Errors
/// returns a [NetworkError] if the model fails on a sample, or a sample's labels don't match the model's output dimension
pub fn validate_model<T: TrainingObserver>(
    validation_data: &[Sample],
    model: &Network,
    normalize_hidden: bool,
    observer: &T,
) -> Result<f64, NetworkError> {
    let mut validation_loss = 0.0;

    for sample in validation_data {
        let output = model.infer(sample.features(), normalize_hidden)?;
        let (loss, _) = calculate_squared_error_and_gradient(&output, sample.labels())?;
        validation_loss += loss;
        observer.on_sample_end();
    }
    validation_loss /= validation_data.len().max(1) as f64;

    Ok(validation_loss)
}

/// Returns the squared error `½·Σ(actual - expected)²` and its gradient with respect to each output, `actual - expected`
fn calculate_squared_error_and_gradient(
    actual: &[f64],
    expected: &[f64],
) -> Result<(f64, Vec<f64>), NetworkError> {
    if actual.len() != expected.len() {
        return Err(NetworkError::MissizedTarget {
            actual: expected.len(),
            expected: actual.len(),
        });
    }
    let gradient: Vec<f64> = actual
        .iter()
        .zip(expected)
        .map(|(a, e)| a - e)
        .collect();
    let loss = 0.5 * gradient.iter().map(|d| d * d).sum::<f64>();
    Ok((loss, gradient))
}

/// Indicates whether the model should be tested against the validation data set after each epoch
pub enum EachEpoch<'a> {
    /// Test the model against the validation data set after each epoch, and report the validation loss through the [TrainingObserver]
    ValidateModel(&'a [Sample]),
    /// Do not test the model against the validation data set after each epoch
    DoNotValidateModel,
}

/// An observer that does nothing when called.
/// Used for ignoring training events in the [train_model] function.
#[derive(Default)]
pub struct EmptyObserver {}
impl EmptyObserver {
    /// Create a new instance of the EmptyObserver
    pub fn new() -> Self {
        EmptyObserver {}
    }
}
impl TrainingObserver for EmptyObserver {
    fn on_epoch_end(&self, _epoch: usize, _epoch_loss: f64, _validation_loss: f64) {
        // do nothing
    }
    fn on_sample_end(&self) {
        // do nothing
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_squared_error_and_gradient() {
        let (loss, gradient) = calculate_squared_error_and_gradient(&[1.5, -1.0], &[1.0, 1.0]).unwrap();
        assert_eq!(loss, 0.5 * (0.25 + 4.0));
        assert_eq!(gradient, vec![0.5, -2.0]);
    }

    #[test]
    fn test_squared_error_missized_target() {
        assert_eq!(
            calculate_squared_error_and_gradient(&[1.0, 2.0], &[1.0]).unwrap_err(),
            NetworkError::MissizedTarget {
                actual: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn test_train_reports_missized_labels() {
        let mut model = Network::new(1, &[1], &[1], &[2], &[1.0]).unwrap();
        model.interpolate_splines();
        let training_data = vec![Sample::new(vec![0.5], vec![1.0, 2.0])];
        let options = TrainingOptions {
            num_epochs: 1,
            shuffle: false,
            ..TrainingOptions::default()
        };
        let result = train_model(
            model,
            &training_data,
            EachEpoch::DoNotValidateModel,
            &EmptyObserver::new(),
            options,
        );
        assert_eq!(
            result.unwrap_err(),
            TrainingError {
                source: NetworkError::MissizedTarget {
                    actual: 2,
                    expected: 1
                },
                epoch: 1,
                sample: 0
            }
        );
    }

    #[test]
    fn test_validate_does_not_change_model() {
        let mut model = Network::new(1, &[1], &[1], &[2], &[1.0]).unwrap();
        model.interpolate_splines();
        let before = model.clone();
        let validation_data = vec![Sample::new(vec![0.5], vec![1.0])];
        let loss = validate_model(&validation_data, &model, false, &EmptyObserver::new()).unwrap();
        assert_eq!(loss, 0.5);
        assert_eq!(model, before);
        assert!(model.layers()[0].last_output().is_none());
    }

    #[test]
    fn test_error_send() {
        fn assert_send<T: Send>() {}
        assert_send::<TrainingError>();
    }

    #[test]
    fn test_error_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<TrainingError>();
    }
}

use std::fmt::Debug;

use strum::{Display, EnumIter};

/// An element-wise function applied to the output of a [`Layer`](crate::layer::Layer).
///
/// Attach one with [`Layer::with_activation`](crate::layer::Layer::with_activation). A layer without an activation passes its sums through unchanged.
pub trait Activation: Debug + Send + Sync {
    /// apply the activation to `x`
    fn forward(&self, x: f64) -> f64;
    /// Transform `upstream`, the gradient arriving from after the activation, using `value`, the point the activation is evaluated at.
    ///
    /// [`Layer::backward`](crate::layer::Layer::backward) passes a single connection's spline output as `value`.
    fn backward(&self, value: f64, upstream: f64) -> f64;
}

/// Common activation functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
pub enum StandardActivation {
    /// f(x) = x
    Identity,
    /// f(x) = max(0, x)
    Relu,
    /// f(x) = 1 / (1 + e^-x)
    Sigmoid,
    /// f(x) = tanh(x)
    Tanh,
}

impl Activation for StandardActivation {
    fn forward(&self, x: f64) -> f64 {
        match self {
            StandardActivation::Identity => x,
            StandardActivation::Relu => x.max(0.0),
            StandardActivation::Sigmoid => sigmoid(x),
            StandardActivation::Tanh => x.tanh(),
        }
    }

    fn backward(&self, value: f64, upstream: f64) -> f64 {
        let derivative = match self {
            StandardActivation::Identity => 1.0,
            StandardActivation::Relu => {
                if value > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            StandardActivation::Sigmoid => {
                let s = sigmoid(value);
                s * (1.0 - s)
            }
            StandardActivation::Tanh => 1.0 - value.tanh().powi(2),
        };
        derivative * upstream
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

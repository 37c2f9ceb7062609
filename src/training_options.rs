use std::fmt;

/// Used by the [`train_model`](crate::train_model) function to determine how the model should be trained.
#[derive(Clone, PartialEq, Debug)]
pub struct TrainingOptions {
    /// number of epochs for which to train, where an epoch is one complete pass through the training data
    pub num_epochs: usize,
    /// number of samples whose gradients are accumulated before they're applied to the model. A batch size of 1 updates the model after every sample
    pub batch_size: usize,
    /// the learning rate set on every layer of the model before training starts
    pub learning_rate: f64,
    /// whether the outputs of hidden layers are divided by their largest value. See [`Layer::forward`](crate::layer::Layer::forward)
    pub normalize_hidden: bool,
    /// whether the order of the training data is shuffled at the start of every epoch
    pub shuffle: bool,
    /// seed for the shuffle, for reproducible runs. If `None`, the shuffle is seeded from system entropy
    pub seed: Option<u64>,
}

impl TrainingOptions {
    /// Create a new TrainingOptions struct with the given parameters.
    /// # Errors
    /// Returns [`TrainingOptionsError`] error if...
    /// * `batch_size` is 0,
    /// * `learning_rate` is not a finite positive number.
    pub fn new(
        num_epochs: usize,
        batch_size: usize,
        learning_rate: f64,
        normalize_hidden: bool,
        shuffle: bool,
        seed: Option<u64>,
    ) -> Result<Self, TrainingOptionsError> {
        if batch_size == 0 {
            return Err(TrainingOptionsError::ZeroBatchSize);
        }
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(TrainingOptionsError::InvalidLearningRate { learning_rate });
        }
        Ok(TrainingOptions {
            num_epochs,
            batch_size,
            learning_rate,
            normalize_hidden,
            shuffle,
            seed,
        })
    }
}

impl Default for TrainingOptions {
    /// Returns a TrainingOptions struct with the following default values:
    /// * `num_epochs`: 100
    /// * `batch_size`: 1
    /// * `learning_rate`: 0.1
    /// * `normalize_hidden`: false
    /// * `shuffle`: true
    /// * `seed`: None
    fn default() -> Self {
        TrainingOptions {
            num_epochs: 100,
            batch_size: 1,
            learning_rate: 0.1,
            normalize_hidden: false,
            shuffle: true,
            seed: None,
        }
    }
}

/// Errors that can occur when creating a new TrainingOptions struct
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrainingOptionsError {
    /// The batch size was 0, so gradients would never be applied
    ZeroBatchSize,
    /// The learning rate was not a finite positive number
    InvalidLearningRate {
        /// The learning rate received
        learning_rate: f64,
    },
}

impl fmt::Display for TrainingOptionsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrainingOptionsError::ZeroBatchSize => write!(f, "Batch size must be at least 1"),
            TrainingOptionsError::InvalidLearningRate { learning_rate } => write!(
                f,
                "Learning rate must be finite and positive, got {}",
                learning_rate
            ),
        }
    }
}

impl std::error::Error for TrainingOptionsError {}

/// Structs implementing this trait can be used to observe the training process.
pub trait TrainingObserver {
    /// called by [`crate::train_model`] at the end of each epoch. validation loss will be NaN if [`crate::train_model`] was called with [`EachEpoch::DoNotValidateModel`](crate::EachEpoch).
    fn on_epoch_end(&self, epoch: usize, epoch_loss: f64, validation_loss: f64);

    /// called by [`crate::train_model`] and [`crate::validate_model`] after each sample is processed
    fn on_sample_end(&self);
}

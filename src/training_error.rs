use crate::network::network_errors::NetworkError;

/// Indicates that an error was encountered during training
///
/// If displayed, this error will show the epoch and sample at which the error was encountered, as well as the [NetworkError] that caused the error.
#[derive(Clone, PartialEq, Debug)]
pub struct TrainingError {
    /// The error that caused the training error
    pub source: NetworkError,
    /// The epoch (one-indexed) at which the error was encountered
    pub epoch: usize,
    /// The position, within the epoch's sample order, of the sample that failed.
    /// Failures while validating report the number of training samples instead
    pub sample: usize,
}

impl std::fmt::Display for TrainingError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "epoch {} sample {} encountered error {}",
            self.epoch, self.sample, self.source
        )
    }
}

impl std::error::Error for TrainingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

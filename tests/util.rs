use splinenet::training_observer::TrainingObserver;
use std::cell::RefCell;

/// prints every epoch, and remembers the losses so tests can inspect the training curve
pub struct TestObserver {
    epoch_losses: RefCell<Vec<f64>>,
    validation_losses: RefCell<Vec<f64>>,
}

#[allow(dead_code)]
impl TestObserver {
    pub fn new() -> Self {
        TestObserver {
            epoch_losses: RefCell::new(Vec::new()),
            validation_losses: RefCell::new(Vec::new()),
        }
    }

    pub fn epoch_losses(&self) -> Vec<f64> {
        self.epoch_losses.borrow().clone()
    }

    pub fn validation_losses(&self) -> Vec<f64> {
        self.validation_losses.borrow().clone()
    }
}

impl TrainingObserver for TestObserver {
    fn on_epoch_end(&self, epoch: usize, epoch_loss: f64, validation_loss: f64) {
        println!(
            "Epoch: {}, Epoch Loss: {}, Validation Loss: {}",
            epoch, epoch_loss, validation_loss
        );
        self.epoch_losses.borrow_mut().push(epoch_loss);
        self.validation_losses.borrow_mut().push(validation_loss);
    }

    fn on_sample_end(&self) {
        // do nothing
    }
}

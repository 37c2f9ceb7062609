use splinenet::network::Network;
use splinenet::training_options::TrainingOptions;
use splinenet::{train_model, validate_model, EachEpoch, EmptyObserver, Sample};
use test_log::test;

mod util;
use util::TestObserver;

fn build_data() -> Vec<Sample> {
    [(0.5, 1.0), (1.0, 2.0), (1.1, 2.5), (1.5, 3.0)]
        .iter()
        .map(|(x, y)| Sample::new(vec![*x], vec![*y]))
        .collect()
}

fn build_model() -> Network {
    let mut model = Network::new(1, &[1], &[1], &[8], &[2.0]).unwrap();
    model.interpolate_splines();
    model
}

fn assert_strictly_decreasing(losses: &[f64]) {
    for (epoch, pair) in losses.windows(2).enumerate() {
        assert!(
            pair[1] < pair[0],
            "loss did not decrease after epoch {}: {:?}",
            epoch + 1,
            losses
        );
    }
}

fn train_and_check(batch_size: usize) {
    let data = build_data();
    let observer = TestObserver::new();
    let options = TrainingOptions {
        num_epochs: 10,
        batch_size,
        learning_rate: 0.05,
        shuffle: false,
        ..TrainingOptions::default()
    };
    let initial_loss = validate_model(&data, &build_model(), false, &EmptyObserver::new()).unwrap();
    let trained = train_model(
        build_model(),
        &data,
        EachEpoch::ValidateModel(&data),
        &observer,
        options,
    )
    .unwrap();

    let epoch_losses = observer.epoch_losses();
    let validation_losses = observer.validation_losses();
    assert_eq!(epoch_losses.len(), 10);
    assert_eq!(validation_losses.len(), 10);
    assert_strictly_decreasing(&epoch_losses);
    assert_strictly_decreasing(&validation_losses);
    assert!(validation_losses[0] < initial_loss);

    let final_loss = validate_model(&data, &trained, false, &EmptyObserver::new()).unwrap();
    assert_eq!(final_loss, validation_losses[9]);
}

#[test]
fn training_lowers_loss_one_sample_at_a_time() {
    train_and_check(1);
}

#[test]
fn training_lowers_loss_in_mini_batches() {
    train_and_check(2);
}

#[test]
fn training_lowers_loss_in_full_batches() {
    train_and_check(4);
}

#[test]
fn seeded_shuffle_is_reproducible() {
    let data = build_data();
    let options = TrainingOptions {
        num_epochs: 3,
        learning_rate: 0.05,
        seed: Some(42),
        ..TrainingOptions::default()
    };
    let first = train_model(
        build_model(),
        &data,
        EachEpoch::DoNotValidateModel,
        &EmptyObserver::new(),
        options.clone(),
    )
    .unwrap();
    let second = train_model(
        build_model(),
        &data,
        EachEpoch::DoNotValidateModel,
        &EmptyObserver::new(),
        options,
    )
    .unwrap();
    assert_eq!(first, second);
}

#[test]
fn training_without_validation_reports_nan() {
    let observer = TestObserver::new();
    let options = TrainingOptions {
        num_epochs: 2,
        learning_rate: 0.05,
        shuffle: false,
        ..TrainingOptions::default()
    };
    train_model(
        build_model(),
        &build_data(),
        EachEpoch::DoNotValidateModel,
        &observer,
        options,
    )
    .unwrap();
    assert!(observer.validation_losses().iter().all(|loss| loss.is_nan()));
}

#[test]
fn training_reports_out_of_domain_sample() {
    let mut data = build_data();
    data.push(Sample::new(vec![2.5], vec![1.0]));
    let options = TrainingOptions {
        num_epochs: 1,
        shuffle: false,
        ..TrainingOptions::default()
    };
    let error = train_model(
        build_model(),
        &data,
        EachEpoch::DoNotValidateModel,
        &EmptyObserver::new(),
        options,
    )
    .unwrap_err();
    assert_eq!(error.epoch, 1);
    assert_eq!(error.sample, 4);
}

//! Supervised epoch routines
//!
//! A custom training loop using Burn's optimizer API directly: one call per
//! epoch, with batches assembled lazily from shuffled indices.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::center_loss::CenterLoss;
use crate::dataset::{TimeSeriesBatch, TimeSeriesBatcher, TimeSeriesDataset};
use crate::model::TimeSeriesClassifier;

/// Loss and accuracy of one pass over a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Sample-weighted mean cross-entropy
    pub loss: f64,
    /// Fraction of correct predictions in `[0, 1]`
    pub accuracy: f64,
}

/// Metrics of one epoch of the center-loss phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CenterLossEpochMetrics {
    pub ce_loss: f64,
    pub center_loss: f64,
    pub accuracy: f64,
}

impl CenterLossEpochMetrics {
    /// Combined objective `ce + weight * center`
    pub fn total_loss(&self, center_loss_weight: f64) -> f64 {
        self.ce_loss + center_loss_weight * self.center_loss
    }
}

/// Running sums over the batches of an epoch
#[derive(Debug, Default)]
struct Accumulator {
    ce_sum: f64,
    center_sum: f64,
    correct: usize,
    samples: usize,
}

impl Accumulator {
    fn add(&mut self, batch_size: usize, ce: f64, center: f64, correct: usize) {
        self.ce_sum += ce * batch_size as f64;
        self.center_sum += center * batch_size as f64;
        self.correct += correct;
        self.samples += batch_size;
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            sum / self.samples as f64
        }
    }

    fn accuracy(&self) -> f64 {
        self.mean(self.correct as f64)
    }

    fn metrics(&self) -> EpochMetrics {
        EpochMetrics {
            loss: self.mean(self.ce_sum),
            accuracy: self.accuracy(),
        }
    }

    fn center_loss_metrics(&self) -> CenterLossEpochMetrics {
        CenterLossEpochMetrics {
            ce_loss: self.mean(self.ce_sum),
            center_loss: self.mean(self.center_sum),
            accuracy: self.accuracy(),
        }
    }
}

/// Dataset paired with its batcher and batch size
#[derive(Debug, Clone)]
pub struct BatchLoader {
    dataset: TimeSeriesDataset,
    batcher: TimeSeriesBatcher,
    batch_size: usize,
}

impl BatchLoader {
    pub fn new(dataset: TimeSeriesDataset, batch_size: usize) -> Self {
        let batcher = TimeSeriesBatcher::for_dataset(&dataset);
        Self {
            dataset,
            batcher,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dataset(&self) -> &TimeSeriesDataset {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// Sample indices of an epoch, shuffled when an RNG is given
    pub fn epoch_indices(&self, rng: Option<&mut ChaCha8Rng>) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        if let Some(rng) = rng {
            indices.shuffle(rng);
        }
        indices
    }

    /// Assemble the batch for `indices`, `None` when it would be empty
    pub fn load<B: Backend>(&self, indices: &[usize], device: &B::Device) -> Option<TimeSeriesBatch<B>> {
        let items: Vec<_> = indices.iter().filter_map(|&i| self.dataset.get(i)).collect();
        if items.is_empty() {
            return None;
        }
        Some(self.batcher.batch(items, device))
    }
}

/// Number of rows whose arg-max matches the target
fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = logits.argmax(1).squeeze::<1>(1);
    let correct: i64 = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

/// One epoch of cross-entropy training
///
/// Returns the updated model and the epoch's training metrics.
pub fn train_epoch<B, M, O>(
    mut model: M,
    optimizer: &mut O,
    loader: &BatchLoader,
    learning_rate: f64,
    rng: &mut ChaCha8Rng,
    device: &B::Device,
) -> (M, EpochMetrics)
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + TimeSeriesClassifier<B>,
    O: Optimizer<M, B>,
{
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let indices = loader.epoch_indices(Some(rng));
    let mut acc = Accumulator::default();

    for chunk in indices.chunks(loader.batch_size()) {
        let Some(batch) = loader.load::<B>(chunk, device) else {
            continue;
        };
        let batch_size = batch.targets.dims()[0];

        let output = model.forward(batch.inputs);
        let loss = loss_fn.forward(output.logits.clone(), batch.targets.clone());

        let loss_value: f64 = loss.clone().into_scalar().elem();
        let correct = count_correct(output.logits, batch.targets);
        acc.add(batch_size, loss_value, 0.0, correct);

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optimizer.step(learning_rate, model, grads);
    }

    (model, acc.metrics())
}

/// Evaluate a model in inference mode, without shuffling
///
/// Pass `model.valid()` when the model lives on an autodiff backend.
pub fn evaluate<B, M>(model: &M, loader: &BatchLoader, device: &B::Device) -> EpochMetrics
where
    B: Backend,
    M: TimeSeriesClassifier<B>,
{
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let indices = loader.epoch_indices(None);
    let mut acc = Accumulator::default();

    for chunk in indices.chunks(loader.batch_size()) {
        let Some(batch) = loader.load::<B>(chunk, device) else {
            continue;
        };
        let batch_size = batch.targets.dims()[0];

        let output = model.forward(batch.inputs);
        let loss: f64 = loss_fn
            .forward(output.logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        let correct = count_correct(output.logits, batch.targets);
        acc.add(batch_size, loss, 0.0, correct);
    }

    acc.metrics()
}

/// Optimizers of the center-loss phase
///
/// Both share the learning rate and weight decay, which makes the pair
/// equivalent to one Adam over the union of the parameters.
pub struct CenterLossOptimizers<O, OC> {
    pub model: O,
    pub centers: OC,
}

/// One epoch of joint cross-entropy and center-loss training
///
/// A single backward pass of `ce + weight * center` produces the gradients of
/// both the model and the centroids, which are then stepped separately.
#[allow(clippy::too_many_arguments)]
pub fn train_epoch_with_center_loss<B, M, O, OC>(
    mut model: M,
    mut center_loss: CenterLoss<B>,
    optimizers: &mut CenterLossOptimizers<O, OC>,
    loader: &BatchLoader,
    learning_rate: f64,
    center_loss_weight: f64,
    rng: &mut ChaCha8Rng,
    device: &B::Device,
) -> (M, CenterLoss<B>, CenterLossEpochMetrics)
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + TimeSeriesClassifier<B>,
    O: Optimizer<M, B>,
    OC: Optimizer<CenterLoss<B>, B>,
{
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let indices = loader.epoch_indices(Some(rng));
    let mut acc = Accumulator::default();

    for chunk in indices.chunks(loader.batch_size()) {
        let Some(batch) = loader.load::<B>(chunk, device) else {
            continue;
        };
        let batch_size = batch.targets.dims()[0];

        let output = model.forward(batch.inputs);
        let ce = loss_fn.forward(output.logits.clone(), batch.targets.clone());
        let center = center_loss.forward(output.embeddings, batch.targets.clone());

        let ce_value: f64 = ce.clone().into_scalar().elem();
        let center_value: f64 = center.clone().into_scalar().elem();
        let correct = count_correct(output.logits, batch.targets);
        acc.add(batch_size, ce_value, center_value, correct);

        let loss = ce + center.mul_scalar(center_loss_weight);
        let mut grads = loss.backward();
        let model_grads = GradientsParams::from_module(&mut grads, &model);
        let center_grads = GradientsParams::from_module(&mut grads, &center_loss);

        model = optimizers.model.step(learning_rate, model, model_grads);
        center_loss = optimizers.centers.step(learning_rate, center_loss, center_grads);
    }

    (model, center_loss, acc.center_loss_metrics())
}

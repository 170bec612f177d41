//! The fit loop: frozen-backbone forward, head-only optimization, per-epoch
//! validation.

use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor};
use mask_dataset::{EncodedSample, EvalBatches, TrainBatchIter};
use models::MaskClassifier;
use thiserror::Error;

use crate::history::{EpochMetrics, TrainingHistory};

pub type TrainingResult<T> = Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Dataset(#[from] mask_dataset::DatasetError),
    #[error(transparent)]
    Backbone(#[from] models::BackboneLoadError),
    #[error("tensor readback failed: {0}")]
    Readback(String),
}

/// Fixed hyperparameters for one run.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub init_lr: f64,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 30,
            batch_size: 32,
            init_lr: 1e-4,
            seed: 42,
        }
    }
}

impl TrainConfig {
    /// Learning rate for an epoch: linear decay from `init_lr` toward zero
    /// across the configured epoch count.
    pub fn lr_at(&self, epoch: usize) -> f64 {
        self.init_lr * (1.0 - epoch as f64 / self.epochs as f64)
    }
}

/// Run the training state machine and return the trained model plus history.
///
/// Each epoch draws `floor(|train| / batch_size)` augmented batches, steps
/// Adam on the head alone, then measures loss/accuracy over
/// `floor(|val| / batch_size)` unaugmented validation batches on the inner
/// backend (dropout inactive). The history gains exactly one entry per
/// epoch. Splits smaller than the batch size are rejected before any step
/// runs.
pub fn fit<B: AutodiffBackend>(
    model: MaskClassifier<B>,
    train: &mut TrainBatchIter,
    val: &[EncodedSample],
    config: &TrainConfig,
    device: &B::Device,
) -> TrainingResult<(MaskClassifier<B>, TrainingHistory)> {
    if config.epochs == 0 {
        return Err(TrainingError::Config("epoch count must be nonzero".into()));
    }
    if config.batch_size == 0 {
        return Err(TrainingError::Config("batch size must be nonzero".into()));
    }
    if train.batch_size() != config.batch_size {
        return Err(TrainingError::Config(format!(
            "batch stream yields {} per pull but the run is configured for {}",
            train.batch_size(),
            config.batch_size
        )));
    }
    if train.len() < config.batch_size {
        return Err(TrainingError::Config(format!(
            "training split has {} samples, fewer than batch size {}; zero steps per epoch",
            train.len(),
            config.batch_size
        )));
    }
    if val.len() < config.batch_size {
        return Err(TrainingError::Config(format!(
            "validation split has {} samples, fewer than batch size {}; zero steps per epoch",
            val.len(),
            config.batch_size
        )));
    }

    B::seed(config.seed);
    let steps_per_epoch = train.steps_per_epoch();
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut optim = AdamConfig::new().init();
    let mut history = TrainingHistory::new();
    let mut model = model;

    for epoch in 0..config.epochs {
        let lr = config.lr_at(epoch);
        let mut loss_sum = 0.0f32;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for _ in 0..steps_per_epoch {
            let batch = train.next_batch::<B>(device);
            let logits = model.forward(batch.images);
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
            loss_sum += loss.clone().into_scalar().elem::<f32>();
            correct += count_correct(logits, batch.targets);
            seen += config.batch_size;

            let grads = GradientsParams::from_grads(loss.backward(), &model.head);
            let MaskClassifier { backbone, head } = model;
            let head = optim.step(lr, head, grads);
            model = MaskClassifier { backbone, head };
        }

        let (val_loss, val_accuracy) =
            validation_metrics(&model.valid(), val, config.batch_size, device)?;
        let metrics = EpochMetrics {
            epoch: epoch + 1,
            train_loss: loss_sum / steps_per_epoch as f32,
            train_accuracy: correct as f32 / seen as f32,
            val_loss,
            val_accuracy,
        };
        println!(
            "epoch {}/{}: loss {:.4} acc {:.4} val_loss {:.4} val_acc {:.4} (lr {:.2e})",
            epoch + 1,
            config.epochs,
            metrics.train_loss,
            metrics.train_accuracy,
            metrics.val_loss,
            metrics.val_accuracy,
            lr
        );
        history.push(metrics);
    }

    Ok((model, history))
}

/// Mean loss and accuracy over the full validation batches.
///
/// Only whole batches count here, mirroring the per-epoch monitoring pass;
/// the final report covers every sample including the tail.
pub fn validation_metrics<B: Backend>(
    model: &MaskClassifier<B>,
    val: &[EncodedSample],
    batch_size: usize,
    device: &B::Device,
) -> TrainingResult<(f32, f32)> {
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut batches = EvalBatches::new(val, batch_size);
    let steps = batches.full_batches();
    let mut loss_sum = 0.0f32;
    let mut correct = 0usize;
    let mut seen = 0usize;
    for _ in 0..steps {
        let Some(batch) = batches.next_batch::<B>(device) else {
            break;
        };
        let n = batch.images.dims()[0];
        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
        loss_sum += loss.into_scalar().elem::<f32>();
        correct += count_correct(logits, batch.targets);
        seen += n;
    }
    if seen == 0 {
        return Err(TrainingError::Config(
            "validation pass covered zero samples".into(),
        ));
    }
    Ok((loss_sum / steps as f32, correct as f32 / seen as f32))
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let n = targets.dims()[0];
    let preds = logits.argmax(1).reshape([n]);
    preds
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lr_decays_linearly_to_the_last_epoch() {
        let config = TrainConfig::default();
        assert!((config.lr_at(0) - 1e-4).abs() < 1e-12);
        assert!((config.lr_at(15) - 5e-5).abs() < 1e-12);
        let last = config.lr_at(29);
        assert!(last > 0.0 && last < 1e-5);
    }

    #[test]
    fn default_config_matches_the_recipe() {
        let config = TrainConfig::default();
        assert_eq!(config.epochs, 30);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.seed, 42);
        assert!((config.init_lr - 1e-4).abs() < 1e-12);
    }
}

//! Burn models for the face-mask classifier.
//!
//! This crate defines the transfer-learning model:
//! - `Backbone`: convolutional feature extractor, 224x224x3 in, 7x7 feature map out.
//! - `MaskHead`: pooled-feature classifier producing per-class logits.
//! - `MaskClassifier`: backbone + head composed into one module.
//!
//! These are pure Burn Modules with no awareness of datasets or training
//! loops; the `training` crate drives them.
//!
//! ## Design Note
//! Freezing is structural rather than flag-based: `MaskClassifier::forward`
//! detaches the backbone features, and [`assemble`] reports the frozen vs
//! trainable parameter partition so the caller's optimizer steps the head
//! module alone. Backbone weights load from a record file or not at all;
//! random initialization is never a fallback for a missing record.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::activation::{relu, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Input edge length the backbone weights were trained for.
pub const INPUT_SIZE: usize = 224;
/// Spatial edge of the backbone's output feature map.
pub const FEATURE_SIZE: usize = 7;
/// Feature channels after projection at width 1.0.
pub const FEATURE_DIM: usize = 1280;

#[derive(Debug, Error)]
pub enum BackboneLoadError {
    #[error("weights record not found at {path}")]
    Missing { path: PathBuf },
    #[error("failed to load weights record {path}: {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: RecorderError,
    },
}

#[derive(Debug, Clone)]
pub struct BackboneConfig {
    /// Channel width multiplier; 1.0 matches the pretrained contract.
    pub width: f64,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self { width: 1.0 }
    }
}

impl BackboneConfig {
    /// Feature channels after the projection at this width.
    pub fn feature_dim(&self) -> usize {
        scale(FEATURE_DIM, self.width)
    }
}

fn scale(channels: usize, width: f64) -> usize {
    ((channels as f64 * width).round() as usize).max(8)
}

fn relu6<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.clamp(0.0, 6.0)
}

/// Depthwise 3x3 stride-2 conv followed by a pointwise 1x1 expansion.
#[derive(Debug, Module)]
struct SepBlock<B: Backend> {
    depthwise: Conv2d<B>,
    pointwise: Conv2d<B>,
}

impl<B: Backend> SepBlock<B> {
    fn new(cin: usize, cout: usize, device: &B::Device) -> Self {
        let depthwise = Conv2dConfig::new([cin, cin], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_groups(cin)
            .init(device);
        let pointwise = Conv2dConfig::new([cin, cout], [1, 1]).init(device);
        Self {
            depthwise,
            pointwise,
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu6(self.depthwise.forward(x));
        relu6(self.pointwise.forward(x))
    }
}

/// Feature extractor: stem conv + four separable stages + 1x1 projection.
///
/// Spatial path at [`INPUT_SIZE`]: 224 → 112 → 56 → 28 → 14 → 7.
#[derive(Debug, Module)]
pub struct Backbone<B: Backend> {
    stem: Conv2d<B>,
    blocks: Vec<SepBlock<B>>,
    proj: Conv2d<B>,
    feature_dim: usize,
}

impl<B: Backend> Backbone<B> {
    pub fn new(cfg: BackboneConfig, device: &B::Device) -> Self {
        let widths = [32, 64, 128, 256, 512].map(|c| scale(c, cfg.width));
        let stem = Conv2dConfig::new([3, widths[0]], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let mut blocks = Vec::new();
        for i in 0..4 {
            blocks.push(SepBlock::new(widths[i], widths[i + 1], device));
        }
        let feature_dim = cfg.feature_dim();
        let proj = Conv2dConfig::new([widths[4], feature_dim], [1, 1]).init(device);
        Self {
            stem,
            blocks,
            proj,
            feature_dim,
        }
    }

    /// Feature channels this backbone emits.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// [n, 3, 224, 224] images to a [n, feature_dim, 7, 7] feature map.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = relu6(self.stem.forward(images));
        for block in &self.blocks {
            x = block.forward(x);
        }
        relu6(self.proj.forward(x))
    }

    /// Load pretrained weights from a record file.
    ///
    /// A missing or unreadable record is fatal; an untrained backbone would
    /// defeat the transfer-learning setup.
    pub fn from_pretrained(
        cfg: BackboneConfig,
        path: &Path,
        device: &B::Device,
    ) -> Result<Self, BackboneLoadError> {
        if !path.exists() {
            return Err(BackboneLoadError::Missing {
                path: path.to_path_buf(),
            });
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        Self::new(cfg, device)
            .load_file(path, &recorder, device)
            .map_err(|source| BackboneLoadError::Record {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Checksum of the features for a fixed probe input.
    ///
    /// Any change to backbone parameters changes this value, so comparing it
    /// before and after training verifies the freeze guarantee.
    pub fn feature_checksum(&self, device: &B::Device) -> f32 {
        let count = 3 * INPUT_SIZE * INPUT_SIZE;
        let probe: Vec<f32> = (0..count).map(|i| (i % 251) as f32 / 251.0).collect();
        let input = Tensor::<B, 1>::from_floats(probe.as_slice(), device).reshape([
            1,
            3,
            INPUT_SIZE,
            INPUT_SIZE,
        ]);
        self.forward(input).abs().sum().into_scalar().elem::<f32>()
    }
}

#[derive(Debug, Clone)]
pub struct HeadConfig {
    pub feature_dim: usize,
    pub hidden: usize,
    pub dropout: f64,
    pub num_classes: usize,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            feature_dim: FEATURE_DIM,
            hidden: 128,
            dropout: 0.5,
            num_classes: 2,
        }
    }
}

/// Trainable classifier over pooled backbone features.
///
/// Average pool over the 7x7 map → flatten → dense 128 with relu → dropout
/// 0.5 → dense output layer of width `num_classes`.
#[derive(Debug, Module)]
pub struct MaskHead<B: Backend> {
    pool: AvgPool2d,
    fc1: nn::Linear<B>,
    dropout: nn::Dropout,
    fc2: nn::Linear<B>,
    feature_dim: usize,
    num_classes: usize,
}

impl<B: Backend> MaskHead<B> {
    pub fn new(cfg: HeadConfig, device: &B::Device) -> Self {
        let pool = AvgPool2dConfig::new([FEATURE_SIZE, FEATURE_SIZE])
            .with_strides([FEATURE_SIZE, FEATURE_SIZE])
            .init();
        let fc1 = nn::LinearConfig::new(cfg.feature_dim, cfg.hidden).init(device);
        let dropout = nn::DropoutConfig::new(cfg.dropout).init();
        let fc2 = nn::LinearConfig::new(cfg.hidden, cfg.num_classes).init(device);
        Self {
            pool,
            fc1,
            dropout,
            fc2,
            feature_dim: cfg.feature_dim,
            num_classes: cfg.num_classes,
        }
    }

    /// Output width of the final layer.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// [n, feature_dim, 7, 7] features to [n, num_classes] logits.
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let n = features.dims()[0];
        let pooled = self.pool.forward(features);
        let flat = pooled.reshape([n, self.feature_dim]);
        let x = relu(self.fc1.forward(flat));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }
}

/// Backbone and head composed into one end-to-end module.
#[derive(Debug, Module)]
pub struct MaskClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub head: MaskHead<B>,
}

impl<B: Backend> MaskClassifier<B> {
    /// Class logits. Features are detached before the head, so backward
    /// never reaches backbone parameters.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images).detach();
        self.head.forward(features)
    }

    /// Softmax probabilities per class; rows sum to 1.
    pub fn forward_probs(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

/// Frozen vs trainable parameter counts, declared at assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterPartition {
    pub frozen: usize,
    pub trainable: usize,
}

/// A freshly assembled classifier plus its parameter partition.
#[derive(Debug)]
pub struct ModelAssembly<B: Backend> {
    pub model: MaskClassifier<B>,
    pub partition: ParameterPartition,
}

/// Compose the pretrained backbone with a newly initialized head.
///
/// The trainable set is exactly the head's parameters; the partition records
/// both counts for reporting and for the optimizer contract.
pub fn assemble<B: Backend>(
    backbone_cfg: BackboneConfig,
    weights: &Path,
    num_classes: usize,
    device: &B::Device,
) -> Result<ModelAssembly<B>, BackboneLoadError> {
    let feature_dim = backbone_cfg.feature_dim();
    let backbone = Backbone::from_pretrained(backbone_cfg, weights, device)?;
    let head = MaskHead::new(
        HeadConfig {
            feature_dim,
            num_classes,
            ..Default::default()
        },
        device,
    );
    let partition = ParameterPartition {
        frozen: backbone.num_params(),
        trainable: head.num_params(),
    };
    Ok(ModelAssembly {
        model: MaskClassifier { backbone, head },
        partition,
    })
}

/// Save a classifier record in bin format.
pub fn save_classifier<B: Backend>(
    model: MaskClassifier<B>,
    path: &Path,
) -> Result<(), RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model.save_file(path, &recorder)
}

/// Rebuild a classifier from a saved record.
pub fn load_classifier<B: Backend>(
    backbone_cfg: BackboneConfig,
    num_classes: usize,
    path: &Path,
    device: &B::Device,
) -> Result<MaskClassifier<B>, BackboneLoadError> {
    if !path.exists() {
        return Err(BackboneLoadError::Missing {
            path: path.to_path_buf(),
        });
    }
    let feature_dim = backbone_cfg.feature_dim();
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let backbone = Backbone::new(backbone_cfg, device);
    let head = MaskHead::new(
        HeadConfig {
            feature_dim,
            num_classes,
            ..Default::default()
        },
        device,
    );
    MaskClassifier { backbone, head }
        .load_file(path, &recorder, device)
        .map_err(|source| BackboneLoadError::Record {
            path: path.to_path_buf(),
            source,
        })
}

pub mod prelude {
    pub use super::{
        assemble, load_classifier, save_classifier, Backbone, BackboneConfig, BackboneLoadError,
        HeadConfig, MaskClassifier, MaskHead, ModelAssembly, ParameterPartition,
    };
}

//! Integration tests for model assembly and the checkpoint round trip.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::Tensor;
use models::{
    assemble, load_classifier, save_classifier, Backbone, BackboneConfig, BackboneLoadError,
    HeadConfig, MaskClassifier, MaskHead, FEATURE_SIZE, INPUT_SIZE,
};
use std::path::Path;

type B = burn_ndarray::NdArray<f32>;

/// Narrow backbone config so tests stay fast on CPU.
fn tiny_backbone() -> BackboneConfig {
    BackboneConfig { width: 0.05 }
}

fn ramp_images(n: usize, device: &<B as burn::tensor::backend::Backend>::Device) -> Tensor<B, 4> {
    let count = n * 3 * INPUT_SIZE * INPUT_SIZE;
    let values: Vec<f32> = (0..count).map(|i| ((i % 97) as f32 / 97.0) - 0.5).collect();
    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([n, 3, INPUT_SIZE, INPUT_SIZE])
}

fn save_backbone(backbone: Backbone<B>, path: &Path) -> anyhow::Result<()> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    backbone.save_file(path, &recorder)?;
    Ok(())
}

#[test]
fn backbone_emits_the_declared_feature_shape() {
    let device = Default::default();
    let cfg = tiny_backbone();
    let backbone = Backbone::<B>::new(cfg.clone(), &device);
    let features = backbone.forward(ramp_images(2, &device));
    assert_eq!(
        features.dims(),
        [2, cfg.feature_dim(), FEATURE_SIZE, FEATURE_SIZE]
    );
}

#[test]
fn head_parameter_count_matches_layer_arithmetic() {
    let device = Default::default();
    let cfg = HeadConfig {
        feature_dim: 64,
        hidden: 128,
        dropout: 0.5,
        num_classes: 2,
    };
    let head = MaskHead::<B>::new(cfg.clone(), &device);
    let expected = cfg.feature_dim * cfg.hidden + cfg.hidden + cfg.hidden * cfg.num_classes
        + cfg.num_classes;
    assert_eq!(head.num_params(), expected);
    assert_eq!(head.num_classes(), 2);
}

#[test]
fn missing_weights_record_is_fatal() {
    let device = Default::default();
    let err = Backbone::<B>::from_pretrained(
        tiny_backbone(),
        Path::new("/nonexistent/backbone.bin"),
        &device,
    )
    .unwrap_err();
    assert!(matches!(err, BackboneLoadError::Missing { .. }), "got {err:?}");
}

#[test]
fn pretrained_round_trip_preserves_features() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let weights = tmp.path().join("backbone.bin");
    let device = Default::default();

    let original = Backbone::<B>::new(tiny_backbone(), &device);
    let checksum = original.feature_checksum(&device);
    save_backbone(original, &weights)?;

    let loaded = Backbone::<B>::from_pretrained(tiny_backbone(), &weights, &device)?;
    assert_eq!(loaded.feature_checksum(&device), checksum);
    Ok(())
}

#[test]
fn assembly_partitions_parameters_between_backbone_and_head() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let weights = tmp.path().join("backbone.bin");
    let device = Default::default();
    save_backbone(Backbone::<B>::new(tiny_backbone(), &device), &weights)?;

    let assembly = assemble::<B>(tiny_backbone(), &weights, 2, &device)?;
    assert_eq!(
        assembly.partition.frozen,
        assembly.model.backbone.num_params()
    );
    assert_eq!(
        assembly.partition.trainable,
        assembly.model.head.num_params()
    );
    assert_eq!(assembly.model.head.num_classes(), 2);
    Ok(())
}

#[test]
fn probabilities_form_a_distribution() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let weights = tmp.path().join("backbone.bin");
    let device = Default::default();
    save_backbone(Backbone::<B>::new(tiny_backbone(), &device), &weights)?;

    let assembly = assemble::<B>(tiny_backbone(), &weights, 2, &device)?;
    let probs = assembly.model.forward_probs(ramp_images(3, &device));
    assert_eq!(probs.dims(), [3, 2]);
    let rows = probs.into_data().to_vec::<f32>().unwrap();
    for row in rows.chunks(2) {
        assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn classifier_checkpoint_round_trip_preserves_logits() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let device = Default::default();
    let cfg = tiny_backbone();

    let model = MaskClassifier {
        backbone: Backbone::<B>::new(cfg.clone(), &device),
        head: MaskHead::new(
            HeadConfig {
                feature_dim: cfg.feature_dim(),
                num_classes: 2,
                ..Default::default()
            },
            &device,
        ),
    };
    let images = ramp_images(2, &device);
    let before = model
        .forward(images.clone())
        .into_data()
        .to_vec::<f32>()
        .unwrap();

    let ckpt = tmp.path().join("mask_detector.bin");
    save_classifier(model, &ckpt)?;
    let restored = load_classifier::<B>(cfg, 2, &ckpt, &device)?;
    let after = restored.forward(images).into_data().to_vec::<f32>().unwrap();
    assert_eq!(before, after);
    Ok(())
}

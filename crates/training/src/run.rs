//! End-to-end pipelines behind the `train` and `eval` binaries.
//!
//! `run_train` walks the whole path: load and encode the labeled image tree,
//! split it per class, assemble the frozen-backbone classifier, fit the head,
//! evaluate on the held-out split, write artifacts, and record the run.
//! `run_eval` reloads a saved classifier and reports against a labeled tree.

use crate::evaluator::classification_report;
use crate::recorder::{FsRunRecorder, RunRecorder};
use crate::report::render_curves;
use crate::trainer::{fit, TrainConfig};
use crate::TrainBackend;
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::tensor::backend::Backend;
use clap::Parser;
use mask_dataset::{
    encode_dataset, load_directory, stratified_split, AugmentPolicy, LabelEncoder, TrainBatchIter,
};
use models::{assemble, load_classifier, save_classifier, BackboneConfig};
use std::fs;
use std::path::PathBuf;

pub const MODEL_FILENAME: &str = "mask_detector.bin";
pub const PLOT_FILENAME: &str = "training_curves.svg";
pub const LABELS_FILENAME: &str = "labels.json";
pub const HISTORY_FILENAME: &str = "history.jsonl";
pub const REPORT_FILENAME: &str = "report.json";

type ADBackend = Autodiff<TrainBackend>;

#[derive(Parser, Debug)]
#[command(about = "Train the face-mask classifier on a labeled image tree")]
pub struct TrainArgs {
    /// Dataset root containing one subdirectory per category.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Category subdirectories, in label order.
    #[arg(long, value_delimiter = ',', default_value = "with_mask,without_mask")]
    pub categories: Vec<String>,

    /// Pretrained backbone record.
    #[arg(long, default_value = "weights/backbone.bin")]
    pub backbone_weights: PathBuf,

    /// Output directory for the model, labels, history, and plot.
    #[arg(long, default_value = "artifacts")]
    pub out_dir: PathBuf,

    /// Root directory for recorded runs.
    #[arg(long, default_value = "runs")]
    pub runs_dir: PathBuf,

    /// Experiment name the run is recorded under.
    #[arg(long, default_value = "Face Mask Detection")]
    pub experiment: String,

    #[arg(long, default_value_t = 30)]
    pub epochs: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Initial learning rate; decays linearly to zero over the run.
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Fraction of each class held out for validation.
    #[arg(long, default_value_t = 0.2)]
    pub val_fraction: f32,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Backbone width multiplier; 1.0 matches the pretrained weights.
    #[arg(long, default_value_t = 1.0)]
    pub backbone_width: f64,
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    if !(args.val_fraction > 0.0 && args.val_fraction < 1.0) {
        anyhow::bail!(
            "--val-fraction must lie strictly between 0 and 1, got {}",
            args.val_fraction
        );
    }
    if args.categories.len() < 2 {
        anyhow::bail!("need at least two categories, got {:?}", args.categories);
    }

    let device = <ADBackend as Backend>::Device::default();

    println!("loading dataset from {}", args.data_dir.display());
    let (images, labels) = load_directory(&args.data_dir, &args.categories)?;
    let encoder = LabelEncoder::fit(&labels);
    let samples = encode_dataset(images, &labels, &encoder)?;
    let (train, val) = stratified_split(samples, args.val_fraction, args.seed);
    println!(
        "dataset ready: {} train / {} val across {:?}",
        train.len(),
        val.len(),
        encoder.classes()
    );

    let assembly = assemble::<ADBackend>(
        BackboneConfig {
            width: args.backbone_width,
        },
        &args.backbone_weights,
        encoder.num_classes(),
        &device,
    )?;
    println!(
        "model assembled: {} frozen / {} trainable parameters",
        assembly.partition.frozen, assembly.partition.trainable
    );

    let mut batches =
        TrainBatchIter::new(train, AugmentPolicy::default(), args.batch_size, args.seed);
    let config = TrainConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        init_lr: args.lr,
        seed: args.seed,
    };
    let (model, history) = fit(assembly.model, &mut batches, &val, &config, &device)?;

    let report = classification_report(&model.valid(), &val, &encoder, args.batch_size, &device)?;
    println!("{report}");

    fs::create_dir_all(&args.out_dir)?;
    let model_path = args.out_dir.join(MODEL_FILENAME);
    save_classifier(model, &model_path)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;
    let labels_path = args.out_dir.join(LABELS_FILENAME);
    fs::write(&labels_path, serde_json::to_string_pretty(encoder.classes())?)?;
    let history_path = args.out_dir.join(HISTORY_FILENAME);
    history.write_jsonl(&history_path)?;
    let plot_path = args.out_dir.join(PLOT_FILENAME);
    render_curves(&history, &plot_path)?;
    let report_path = args.out_dir.join(REPORT_FILENAME);
    fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
    println!("artifacts written to {}", args.out_dir.display());

    let mut recorder = FsRunRecorder::new(&args.runs_dir);
    let run = recorder.begin_run(&args.experiment)?;
    if let Some(last) = history.last() {
        recorder.log_metric(&run, "loss", last.train_loss as f64)?;
        recorder.log_metric(&run, "accuracy", last.train_accuracy as f64)?;
        recorder.log_metric(&run, "val_loss", last.val_loss as f64)?;
        recorder.log_metric(&run, "val_accuracy", last.val_accuracy as f64)?;
    }
    recorder.log_metric(&run, "eval_accuracy", report.accuracy as f64)?;
    recorder.log_artifact(&run, &plot_path)?;
    recorder.log_artifact(&run, &history_path)?;
    recorder.log_artifact(&run, &report_path)?;
    recorder.log_artifact(&run, &labels_path)?;
    recorder.log_model(&run, &model_path, "mask_detector")?;
    let run_id = run.id.clone();
    recorder.end_run(run)?;
    println!("run {run_id} recorded under {}", args.runs_dir.display());
    Ok(())
}

#[derive(Parser, Debug)]
#[command(about = "Evaluate a saved classifier against a labeled image tree")]
pub struct EvalArgs {
    /// Dataset root containing one subdirectory per category.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Saved classifier record.
    #[arg(long, default_value = "artifacts/mask_detector.bin")]
    pub model: PathBuf,

    /// Label order written at training time.
    #[arg(long, default_value = "artifacts/labels.json")]
    pub labels: PathBuf,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Backbone width multiplier used at training time.
    #[arg(long, default_value_t = 1.0)]
    pub backbone_width: f64,
}

pub fn run_eval(args: EvalArgs) -> anyhow::Result<()> {
    if args.batch_size == 0 {
        anyhow::bail!("--batch-size must be nonzero");
    }
    let device = <TrainBackend as Backend>::Device::default();

    let classes: Vec<String> = serde_json::from_str(&fs::read_to_string(&args.labels)?)?;
    let encoder = LabelEncoder::fit(&classes);

    let (images, labels) = load_directory(&args.data_dir, &classes)?;
    let samples = encode_dataset(images, &labels, &encoder)?;
    println!(
        "evaluating {} samples across {:?}",
        samples.len(),
        encoder.classes()
    );

    let model = load_classifier::<TrainBackend>(
        BackboneConfig {
            width: args.backbone_width,
        },
        encoder.num_classes(),
        &args.model,
        &device,
    )?;
    let report = classification_report(&model, &samples, &encoder, args.batch_size, &device)?;
    println!("{report}");
    Ok(())
}

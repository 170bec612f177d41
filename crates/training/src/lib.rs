#![recursion_limit = "256"]

//! Training pipeline for the face-mask classifier.
//!
//! - Fit loop over augmented batches with a frozen backbone and a trainable
//!   head ([`trainer`]).
//! - Whole-set evaluation with a per-class report ([`evaluator`]).
//! - Per-epoch history, JSONL export, and SVG curves ([`history`], [`report`]).
//! - Filesystem run recording ([`recorder`]).
//! - The `train` and `eval` binaries' pipelines ([`run`]).

pub mod evaluator;
pub mod history;
pub mod recorder;
pub mod report;
pub mod run;
pub mod trainer;

pub use evaluator::{classification_report, predict_classes, ClassReport, ClassificationReport};
pub use history::{EpochMetrics, TrainingHistory};
pub use recorder::{FsRunRecorder, NoopRecorder, RunHandle, RunRecorder, RunRecorderError};
pub use report::render_curves;
pub use run::{run_eval, run_train, EvalArgs, TrainArgs};
pub use trainer::{fit, validation_metrics, TrainConfig, TrainingError, TrainingResult};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

//! Dataset ingestion, label encoding, splitting and augmentation for the
//! face-mask classifier.
//!
//! This crate provides:
//! - Loading a directory-per-category image tree into normalized tensors
//! - One-hot label encoding with a stable class order
//! - Seeded stratified train/validation splitting
//! - Affine augmentation applied lazily on the training batch stream
//! - Burn-compatible batch iteration for training and evaluation

// Module declarations
pub mod aug;
pub mod batch;
pub mod labels;
pub mod loader;
pub mod splits;
pub mod types;

// Re-export public API
pub use aug::{warp_chw, AffineSample, AugmentPolicy};
pub use batch::{EvalBatches, MaskBatch, TrainBatchIter};
pub use labels::{encode_dataset, LabelEncoder};
pub use loader::{load_directory, load_image};
pub use splits::stratified_split;
pub use types::*;

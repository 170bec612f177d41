//! Core sample types and error definitions for mask_dataset.

use std::path::PathBuf;
use thiserror::Error;

/// Spatial edge length every image is resized to at load time.
pub const IMAGE_SIZE: usize = 224;
/// Channels per image after RGB conversion.
pub const CHANNELS: usize = 3;
/// f32 values per image in CHW layout.
pub const PIXELS_PER_IMAGE: usize = CHANNELS * IMAGE_SIZE * IMAGE_SIZE;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("unknown label {label:?}; encoder was fit on {known:?}")]
    UnknownLabel { label: String, known: Vec<String> },
    #[error("category directory {path} contains no image files")]
    EmptyCategory { path: PathBuf },
    #[error("pixel buffer has {len} values, expected {expected}")]
    Shape { len: usize, expected: usize },
    #[error("got {images} images for {labels} labels")]
    LengthMismatch { images: usize, labels: usize },
}

/// One image as normalized f32 values in CHW layout.
///
/// Values are in [-1, 1], the range the pretrained backbone expects. The
/// buffer length is always [`PIXELS_PER_IMAGE`]; the loader guarantees this
/// and [`ImageTensor::new`] checks it for buffers built elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub pixels: Vec<f32>,
}

impl ImageTensor {
    pub fn new(pixels: Vec<f32>) -> DatasetResult<Self> {
        if pixels.len() != PIXELS_PER_IMAGE {
            return Err(DatasetError::Shape {
                len: pixels.len(),
                expected: PIXELS_PER_IMAGE,
            });
        }
        Ok(Self { pixels })
    }
}

/// An image paired with its one-hot encoded label.
#[derive(Debug, Clone)]
pub struct EncodedSample {
    pub image: ImageTensor,
    pub onehot: Vec<f32>,
}

impl EncodedSample {
    /// Index of the hot component of the label row.
    pub fn class_index(&self) -> usize {
        let mut best = 0;
        for (i, v) in self.onehot.iter().enumerate() {
            if *v > self.onehot[best] {
                best = i;
            }
        }
        best
    }
}

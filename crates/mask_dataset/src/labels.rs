//! One-hot label encoding with a stable class order.

use crate::types::{DatasetError, DatasetResult, EncodedSample, ImageTensor};

/// Bijective mapping between category names and one-hot rows.
///
/// Class order is the first-seen order of the sequence passed to
/// [`LabelEncoder::fit`]. The loader emits labels in its configured category
/// order, so indices follow that list. The mapping never changes after fit.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit(labels: &[String]) -> Self {
        let mut classes: Vec<String> = Vec::new();
        for label in labels {
            if !classes.iter().any(|c| c == label) {
                classes.push(label.clone());
            }
        }
        Self { classes }
    }

    /// Category names in encoding order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn index_of(&self, label: &str) -> DatasetResult<usize> {
        self.classes
            .iter()
            .position(|c| c == label)
            .ok_or_else(|| DatasetError::UnknownLabel {
                label: label.to_string(),
                known: self.classes.clone(),
            })
    }

    /// Encode a category name as a one-hot row of width `num_classes`.
    pub fn encode(&self, label: &str) -> DatasetResult<Vec<f32>> {
        let index = self.index_of(label)?;
        let mut row = vec![0.0; self.classes.len()];
        row[index] = 1.0;
        Ok(row)
    }

    /// Inverse of [`LabelEncoder::encode`]: class index back to its name.
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

/// Zip images with their encoded labels into samples for split/batch stages.
///
/// The two sequences must be parallel; a length mismatch is rejected rather
/// than truncated to the shorter side.
pub fn encode_dataset(
    images: Vec<ImageTensor>,
    labels: &[String],
    encoder: &LabelEncoder,
) -> DatasetResult<Vec<EncodedSample>> {
    if images.len() != labels.len() {
        return Err(DatasetError::LengthMismatch {
            images: images.len(),
            labels: labels.len(),
        });
    }
    images
        .into_iter()
        .zip(labels)
        .map(|(image, label)| {
            Ok(EncodedSample {
                image,
                onehot: encoder.encode(label)?,
            })
        })
        .collect()
}

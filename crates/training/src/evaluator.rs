//! Validation-set evaluation and the per-class report.

use burn::tensor::backend::Backend;
use mask_dataset::{EncodedSample, EvalBatches, LabelEncoder};
use models::MaskClassifier;
use serde::Serialize;
use std::fmt;

use crate::trainer::{TrainingError, TrainingResult};

/// Precision/recall/F1 and support for one class.
#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    pub class: String,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: usize,
}

/// Summary over the whole validation set; rows follow the encoder's class
/// order.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassReport>,
    pub accuracy: f32,
    pub macro_precision: f32,
    pub macro_recall: f32,
    pub macro_f1: f32,
    pub total: usize,
}

/// Predicted class index per sample, in input order.
///
/// Probability rows are read back to the host and reduced to their argmax.
/// Deterministic for a fixed model and fixed samples: no augmentation runs
/// here and dropout is inactive outside autodiff backends.
pub fn predict_classes<B: Backend>(
    model: &MaskClassifier<B>,
    samples: &[EncodedSample],
    batch_size: usize,
    device: &B::Device,
) -> TrainingResult<Vec<usize>> {
    if batch_size == 0 {
        return Err(TrainingError::Config("batch size must be nonzero".into()));
    }
    let mut batches = EvalBatches::new(samples, batch_size);
    let mut preds = Vec::with_capacity(samples.len());
    while let Some(batch) = batches.next_batch::<B>(device) {
        let probs = model.forward_probs(batch.images);
        let [_, classes] = probs.dims();
        let rows = probs
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| TrainingError::Readback(format!("{e:?}")))?;
        for row in rows.chunks(classes) {
            let mut best = 0;
            for (i, p) in row.iter().enumerate() {
                if *p > row[best] {
                    best = i;
                }
            }
            preds.push(best);
        }
    }
    Ok(preds)
}

/// Evaluate the finished model over every validation sample, tail included.
pub fn classification_report<B: Backend>(
    model: &MaskClassifier<B>,
    samples: &[EncodedSample],
    encoder: &LabelEncoder,
    batch_size: usize,
    device: &B::Device,
) -> TrainingResult<ClassificationReport> {
    let preds = predict_classes(model, samples, batch_size, device)?;
    let truth: Vec<usize> = samples.iter().map(EncodedSample::class_index).collect();
    Ok(build_report(&preds, &truth, encoder))
}

fn ratio(num: usize, denom: usize) -> f32 {
    if denom == 0 {
        0.0
    } else {
        num as f32 / denom as f32
    }
}

fn build_report(preds: &[usize], truth: &[usize], encoder: &LabelEncoder) -> ClassificationReport {
    debug_assert_eq!(preds.len(), truth.len());
    let k = encoder.num_classes();
    let mut tp = vec![0usize; k];
    let mut fp = vec![0usize; k];
    let mut fn_ = vec![0usize; k];
    let mut support = vec![0usize; k];
    let mut correct = 0usize;

    for (&p, &t) in preds.iter().zip(truth) {
        support[t] += 1;
        if p == t {
            correct += 1;
            tp[p] += 1;
        } else {
            fp[p] += 1;
            fn_[t] += 1;
        }
    }

    let mut classes = Vec::with_capacity(k);
    for (i, name) in encoder.classes().iter().enumerate() {
        let precision = ratio(tp[i], tp[i] + fp[i]);
        let recall = ratio(tp[i], tp[i] + fn_[i]);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        classes.push(ClassReport {
            class: name.clone(),
            precision,
            recall,
            f1,
            support: support[i],
        });
    }

    let inv_k = 1.0 / k.max(1) as f32;
    ClassificationReport {
        accuracy: ratio(correct, truth.len()),
        macro_precision: classes.iter().map(|c| c.precision).sum::<f32>() * inv_k,
        macro_recall: classes.iter().map(|c| c.recall).sum::<f32>() * inv_k,
        macro_f1: classes.iter().map(|c| c.f1).sum::<f32>() * inv_k,
        total: truth.len(),
        classes,
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.class.len())
            .chain(["macro avg".len()])
            .max()
            .unwrap_or(12);
        writeln!(
            f,
            "{:>width$}  {:>9}  {:>9}  {:>9}  {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$}  {:>9.4}  {:>9.4}  {:>9.4}  {:>9}",
                c.class, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9}  {:>9}  {:>9.4}  {:>9}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        writeln!(
            f,
            "{:>width$}  {:>9.4}  {:>9.4}  {:>9.4}  {:>9}",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> LabelEncoder {
        LabelEncoder::fit(&["with_mask".to_string(), "without_mask".to_string()])
    }

    #[test]
    fn report_rows_follow_encoder_order() {
        let report = build_report(&[0, 1, 0, 1], &[0, 1, 1, 0], &encoder());
        let names: Vec<&str> = report.classes.iter().map(|c| c.class.as_str()).collect();
        assert_eq!(names, vec!["with_mask", "without_mask"]);
    }

    #[test]
    fn metrics_match_hand_computed_values() {
        // truth:  0 0 0 1 1
        // preds:  0 0 1 1 0
        let report = build_report(&[0, 0, 1, 1, 0], &[0, 0, 0, 1, 1], &encoder());
        assert_eq!(report.total, 5);
        assert!((report.accuracy - 0.6).abs() < 1e-6);

        let with_mask = &report.classes[0];
        assert_eq!(with_mask.support, 3);
        assert!((with_mask.precision - 2.0 / 3.0).abs() < 1e-6);
        assert!((with_mask.recall - 2.0 / 3.0).abs() < 1e-6);
        assert!((with_mask.f1 - 2.0 / 3.0).abs() < 1e-6);

        let without_mask = &report.classes[1];
        assert_eq!(without_mask.support, 2);
        assert!((without_mask.precision - 0.5).abs() < 1e-6);
        assert!((without_mask.recall - 0.5).abs() < 1e-6);
    }

    #[test]
    fn degenerate_classes_do_not_divide_by_zero() {
        // Nothing predicted or present for class 1.
        let report = build_report(&[0, 0], &[0, 0], &encoder());
        let missing = &report.classes[1];
        assert_eq!(missing.support, 0);
        assert_eq!(missing.precision, 0.0);
        assert_eq!(missing.recall, 0.0);
        assert_eq!(missing.f1, 0.0);
        assert!((report.accuracy - 1.0).abs() < 1e-6);
    }

    #[test]
    fn display_lists_classes_in_order_with_headers() {
        let report = build_report(&[0, 1], &[0, 1], &encoder());
        let text = report.to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("support"));
        let with_pos = text.find("with_mask").unwrap();
        let without_pos = text.find("without_mask").unwrap();
        assert!(with_pos < without_pos);
        assert!(text.contains("macro avg"));
    }
}

//! Seeded stratified train/validation partitioning.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

use crate::types::EncodedSample;

/// Split samples into (train, validation) preserving per-class proportions.
///
/// Per class, indices are shuffled with a `StdRng` seeded from `seed` and
/// `round(count * val_fraction)` of them go to validation; the rest train.
/// Identical seed and input produce an identical split. Original dataset
/// order is preserved within each side, and the two sides are disjoint with
/// union equal to the input.
pub fn stratified_split(
    samples: Vec<EncodedSample>,
    val_fraction: f32,
    seed: u64,
) -> (Vec<EncodedSample>, Vec<EncodedSample>) {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, sample) in samples.iter().enumerate() {
        by_class.entry(sample.class_index()).or_default().push(i);
    }

    let mut to_val = vec![false; samples.len()];
    for (_, mut indices) in by_class {
        let val_count = (indices.len() as f32 * val_fraction).round() as usize;
        indices.shuffle(&mut rng);
        for &i in indices.iter().take(val_count) {
            to_val[i] = true;
        }
    }

    let mut train = Vec::with_capacity(samples.len());
    let mut val = Vec::new();
    for (i, sample) in samples.into_iter().enumerate() {
        if to_val[i] {
            val.push(sample);
        } else {
            train.push(sample);
        }
    }
    (train, val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageTensor, PIXELS_PER_IMAGE};

    /// Samples whose first pixel identifies them, alternating two classes.
    fn marked_samples(per_class: usize) -> Vec<EncodedSample> {
        let mut samples = Vec::new();
        for i in 0..per_class * 2 {
            let class = i % 2;
            let mut pixels = vec![0.0; PIXELS_PER_IMAGE];
            pixels[0] = i as f32;
            let mut onehot = vec![0.0, 0.0];
            onehot[class] = 1.0;
            samples.push(EncodedSample {
                image: ImageTensor { pixels },
                onehot,
            });
        }
        samples
    }

    fn markers(samples: &[EncodedSample]) -> Vec<f32> {
        samples.iter().map(|s| s.image.pixels[0]).collect()
    }

    fn class_count(samples: &[EncodedSample], class: usize) -> usize {
        samples.iter().filter(|s| s.class_index() == class).count()
    }

    #[test]
    fn union_is_exact_and_sides_are_disjoint() {
        let samples = marked_samples(50);
        let (train, val) = stratified_split(samples, 0.2, 42);
        assert_eq!(train.len() + val.len(), 100);

        let mut seen: Vec<f32> = markers(&train);
        seen.extend(markers(&val));
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let expected: Vec<f32> = (0..100).map(|i| i as f32).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn split_is_stratified_per_class() {
        let samples = marked_samples(100);
        let (train, val) = stratified_split(samples, 0.2, 42);
        assert_eq!(val.len(), 40);
        assert_eq!(train.len(), 160);
        assert_eq!(class_count(&val, 0), 20);
        assert_eq!(class_count(&val, 1), 20);
        assert_eq!(class_count(&train, 0), 80);
        assert_eq!(class_count(&train, 1), 80);
    }

    #[test]
    fn rounding_applies_per_class() {
        // 7 samples of one class at 0.2 rounds to 1 validation sample.
        let mut samples = Vec::new();
        for i in 0..7 {
            let mut pixels = vec![0.0; PIXELS_PER_IMAGE];
            pixels[0] = i as f32;
            samples.push(EncodedSample {
                image: ImageTensor { pixels },
                onehot: vec![1.0],
            });
        }
        let (train, val) = stratified_split(samples, 0.2, 7);
        assert_eq!(val.len(), 1);
        assert_eq!(train.len(), 6);
    }

    #[test]
    fn same_seed_same_split() {
        let a = stratified_split(marked_samples(30), 0.25, 9);
        let b = stratified_split(marked_samples(30), 0.25, 9);
        assert_eq!(markers(&a.0), markers(&b.0));
        assert_eq!(markers(&a.1), markers(&b.1));
    }

    #[test]
    fn different_seeds_usually_differ() {
        let a = stratified_split(marked_samples(30), 0.25, 1);
        let b = stratified_split(marked_samples(30), 0.25, 2);
        assert_ne!(markers(&a.1), markers(&b.1));
    }

    #[test]
    fn order_within_sides_follows_dataset_order() {
        let (train, val) = stratified_split(marked_samples(50), 0.2, 3);
        for side in [&train, &val] {
            let m = markers(side);
            let mut sorted = m.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(m, sorted);
        }
    }
}

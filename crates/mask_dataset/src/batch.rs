//! Burn-compatible batch assembly and the training batch stream.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::aug::{warp_chw, AffineSample, AugmentPolicy};
use crate::types::{EncodedSample, CHANNELS, IMAGE_SIZE, PIXELS_PER_IMAGE};

/// One batch on a device: NCHW images plus class-index targets.
///
/// Targets are reduced from the stored one-hot rows to indices, the form the
/// cross-entropy loss consumes.
#[derive(Debug, Clone)]
pub struct MaskBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

fn collate<B: Backend>(
    pixel_rows: Vec<Vec<f32>>,
    targets: Vec<i64>,
    device: &B::Device,
) -> MaskBatch<B> {
    let n = pixel_rows.len();
    let mut flat = Vec::with_capacity(n * PIXELS_PER_IMAGE);
    for row in &pixel_rows {
        flat.extend_from_slice(row);
    }
    let images = Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([
        n,
        CHANNELS,
        IMAGE_SIZE,
        IMAGE_SIZE,
    ]);
    let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [n]), device);
    MaskBatch { images, targets }
}

/// Pull-based, effectively unbounded stream of augmented training batches.
///
/// The visit order reshuffles whenever the cursor would run past the end,
/// so every pull beyond a full pass starts a fresh epoch over the same
/// samples. Transform parameters are drawn from the seeded RNG in sample
/// order; the warps themselves fan out over rayon and are written back in
/// order, so a given seed always produces the same batch sequence.
pub struct TrainBatchIter {
    samples: Vec<EncodedSample>,
    policy: AugmentPolicy,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
    batch_size: usize,
}

impl TrainBatchIter {
    pub fn new(
        samples: Vec<EncodedSample>,
        policy: AugmentPolicy,
        batch_size: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..samples.len()).collect();
        order.shuffle(&mut rng);
        Self {
            samples,
            policy,
            order,
            cursor: 0,
            rng,
            batch_size,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Full batches per pass over the training samples.
    pub fn steps_per_epoch(&self) -> usize {
        self.samples.len() / self.batch_size
    }

    /// Draw the next augmented batch. Never exhausts; wrapping past the end
    /// of the visit order reshuffles it first.
    pub fn next_batch<B: Backend>(&mut self, device: &B::Device) -> MaskBatch<B> {
        debug_assert!(self.batch_size >= 1 && self.batch_size <= self.samples.len());
        if self.cursor + self.batch_size > self.order.len() {
            self.order.shuffle(&mut self.rng);
            self.cursor = 0;
        }
        let picked = self.order[self.cursor..self.cursor + self.batch_size].to_vec();
        self.cursor += self.batch_size;

        let draws: Vec<AffineSample> = picked
            .iter()
            .map(|_| self.policy.draw(&mut self.rng))
            .collect();
        let warped: Vec<Vec<f32>> = picked
            .par_iter()
            .zip(draws.par_iter())
            .map(|(&i, t)| warp_chw(&self.samples[i].image.pixels, t))
            .collect();
        let targets: Vec<i64> = picked
            .iter()
            .map(|&i| self.samples[i].class_index() as i64)
            .collect();
        collate(warped, targets, device)
    }
}

/// Finite pass over unaugmented samples; the final chunk may be partial.
pub struct EvalBatches<'a> {
    samples: &'a [EncodedSample],
    batch_size: usize,
    cursor: usize,
}

impl<'a> EvalBatches<'a> {
    pub fn new(samples: &'a [EncodedSample], batch_size: usize) -> Self {
        debug_assert!(batch_size >= 1);
        Self {
            samples,
            batch_size,
            cursor: 0,
        }
    }

    /// Number of full batches; the partial tail chunk is not counted.
    pub fn full_batches(&self) -> usize {
        self.samples.len() / self.batch_size
    }

    /// Next chunk of raw samples as a batch, or `None` once exhausted.
    pub fn next_batch<B: Backend>(&mut self, device: &B::Device) -> Option<MaskBatch<B>> {
        if self.cursor >= self.samples.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.samples.len());
        let chunk = &self.samples[self.cursor..end];
        self.cursor = end;

        let pixel_rows: Vec<Vec<f32>> = chunk.iter().map(|s| s.image.pixels.clone()).collect();
        let targets: Vec<i64> = chunk.iter().map(|s| s.class_index() as i64).collect();
        Some(collate(pixel_rows, targets, device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageTensor;

    type B = burn_ndarray::NdArray<f32>;

    /// Two-class samples where every pixel of sample `i` equals `i`.
    fn marked_samples(count: usize) -> Vec<EncodedSample> {
        (0..count)
            .map(|i| {
                let mut onehot = vec![0.0, 0.0];
                onehot[i % 2] = 1.0;
                EncodedSample {
                    image: ImageTensor {
                        pixels: vec![i as f32; PIXELS_PER_IMAGE],
                    },
                    onehot,
                }
            })
            .collect()
    }

    fn batch_markers(batch: &MaskBatch<B>) -> Vec<f32> {
        let n = batch.images.dims()[0];
        let data = batch
            .images
            .clone()
            .into_data()
            .to_vec::<f32>()
            .expect("image readback");
        (0..n).map(|i| data[i * PIXELS_PER_IMAGE]).collect()
    }

    #[test]
    fn batch_shapes_match_contract() {
        let mut iter = TrainBatchIter::new(marked_samples(8), AugmentPolicy::identity(), 4, 0);
        let device = Default::default();
        let batch = iter.next_batch::<B>(&device);
        assert_eq!(batch.images.dims(), [4, CHANNELS, IMAGE_SIZE, IMAGE_SIZE]);
        assert_eq!(batch.targets.dims(), [4]);
    }

    #[test]
    fn one_pass_covers_every_sample_once() {
        let mut iter = TrainBatchIter::new(marked_samples(8), AugmentPolicy::identity(), 4, 1);
        assert_eq!(iter.steps_per_epoch(), 2);
        let device = Default::default();
        let mut seen = Vec::new();
        for _ in 0..iter.steps_per_epoch() {
            seen.extend(batch_markers(&iter.next_batch::<B>(&device)));
        }
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, (0..8).map(|i| i as f32).collect::<Vec<f32>>());
    }

    #[test]
    fn stream_restarts_past_the_end() {
        let mut iter = TrainBatchIter::new(marked_samples(5), AugmentPolicy::identity(), 2, 2);
        let device = Default::default();
        // 5 samples at batch 2: the third pull wraps and reshuffles.
        for _ in 0..7 {
            let batch = iter.next_batch::<B>(&device);
            assert_eq!(batch.images.dims()[0], 2);
        }
    }

    #[test]
    fn same_seed_same_batch_sequence() {
        let device = Default::default();
        let mut a = TrainBatchIter::new(marked_samples(6), AugmentPolicy::default(), 3, 9);
        let mut b = TrainBatchIter::new(marked_samples(6), AugmentPolicy::default(), 3, 9);
        for _ in 0..4 {
            let ba = a.next_batch::<B>(&device);
            let bb = b.next_batch::<B>(&device);
            let da = ba.images.into_data().to_vec::<f32>().unwrap();
            let db = bb.images.into_data().to_vec::<f32>().unwrap();
            assert_eq!(da, db);
        }
    }

    #[test]
    fn targets_are_reduced_from_onehot() {
        let samples = marked_samples(4);
        let expected: Vec<i64> = samples.iter().map(|s| s.class_index() as i64).collect();
        let mut batches = EvalBatches::new(&samples, 4);
        let device = Default::default();
        let batch = batches.next_batch::<B>(&device).unwrap();
        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, expected);
    }

    #[test]
    fn eval_batches_visit_everything_with_partial_tail() {
        let samples = marked_samples(5);
        let mut batches = EvalBatches::new(&samples, 2);
        assert_eq!(batches.full_batches(), 2);
        let device = Default::default();
        let mut sizes = Vec::new();
        let mut seen = Vec::new();
        while let Some(batch) = batches.next_batch::<B>(&device) {
            sizes.push(batch.images.dims()[0]);
            seen.extend(batch_markers(&batch));
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(seen, (0..5).map(|i| i as f32).collect::<Vec<f32>>());
    }

    #[test]
    fn eval_batches_leave_pixels_untouched() {
        let samples = marked_samples(3);
        let mut batches = EvalBatches::new(&samples, 3);
        let device = Default::default();
        let batch = batches.next_batch::<B>(&device).unwrap();
        let data = batch.images.into_data().to_vec::<f32>().unwrap();
        for (i, sample) in samples.iter().enumerate() {
            assert_eq!(
                &data[i * PIXELS_PER_IMAGE..(i + 1) * PIXELS_PER_IMAGE],
                sample.image.pixels.as_slice()
            );
        }
    }
}

//! Randomized affine augmentation for training batches.
//!
//! Rotation, shear, zoom and flip compose into a single 2x2 matrix about the
//! image center, followed by a shift. Application inverse-maps every output
//! pixel and samples bilinearly, clamping source coordinates to the nearest
//! edge pixel ("nearest" boundary fill).

use rand::Rng;

use crate::types::{CHANNELS, IMAGE_SIZE};

/// Declarative ranges for the per-sample random transforms.
///
/// All draws are uniform over the symmetric range. Defaults match the
/// training recipe: rotation within ±20°, zoom within ±15%, shift within
/// ±20% of the image extent per axis, shear within ±15%, random horizontal
/// flip.
#[derive(Debug, Clone)]
pub struct AugmentPolicy {
    pub rotation_degrees: f32,
    pub zoom_delta: f32,
    pub shift_fraction: f32,
    pub shear: f32,
    pub horizontal_flip: bool,
}

impl Default for AugmentPolicy {
    fn default() -> Self {
        Self {
            rotation_degrees: 20.0,
            zoom_delta: 0.15,
            shift_fraction: 0.2,
            shear: 0.15,
            horizontal_flip: true,
        }
    }
}

impl AugmentPolicy {
    /// Policy with every range collapsed so draws always yield the identity.
    pub fn identity() -> Self {
        Self {
            rotation_degrees: 0.0,
            zoom_delta: 0.0,
            shift_fraction: 0.0,
            shear: 0.0,
            horizontal_flip: false,
        }
    }

    /// Draw fresh independent transform parameters for one sample.
    pub fn draw(&self, rng: &mut impl Rng) -> AffineSample {
        let max_shift = self.shift_fraction * IMAGE_SIZE as f32;
        AffineSample {
            angle_rad: rng
                .random_range(-self.rotation_degrees..=self.rotation_degrees)
                .to_radians(),
            zoom: 1.0 + rng.random_range(-self.zoom_delta..=self.zoom_delta),
            shift_x: rng.random_range(-max_shift..=max_shift),
            shift_y: rng.random_range(-max_shift..=max_shift),
            shear: rng.random_range(-self.shear..=self.shear),
            flip: self.horizontal_flip && rng.random_bool(0.5),
        }
    }
}

/// Concrete parameters drawn for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineSample {
    pub angle_rad: f32,
    pub zoom: f32,
    /// Horizontal shift in pixels.
    pub shift_x: f32,
    /// Vertical shift in pixels.
    pub shift_y: f32,
    pub shear: f32,
    pub flip: bool,
}

impl AffineSample {
    /// Parameters that leave the image untouched.
    pub fn identity() -> Self {
        Self {
            angle_rad: 0.0,
            zoom: 1.0,
            shift_x: 0.0,
            shift_y: 0.0,
            shear: 0.0,
            flip: false,
        }
    }
}

/// Apply `t` to a CHW pixel buffer of [`IMAGE_SIZE`]² spatial extent.
///
/// Identity parameters reproduce the input bit-for-bit; a pure flip is an
/// exact mirror (integer source coordinates, no interpolation).
pub fn warp_chw(pixels: &[f32], t: &AffineSample) -> Vec<f32> {
    let w = IMAGE_SIZE;
    let h = IMAGE_SIZE;
    debug_assert_eq!(pixels.len(), CHANNELS * w * h);

    let (sin, cos) = t.angle_rad.sin_cos();
    let zx = if t.flip { -t.zoom } else { t.zoom };
    let zy = t.zoom;
    // Forward matrix R(angle) * Shear(k) * Scale(zx, zy), row major.
    let a = cos * zx;
    let b = (cos * t.shear - sin) * zy;
    let c = sin * zx;
    let d = (sin * t.shear + cos) * zy;
    // zoom stays well away from zero, so the matrix is invertible.
    let det = a * d - b * c;
    let inv_a = d / det;
    let inv_b = -b / det;
    let inv_c = -c / det;
    let inv_d = a / det;

    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    let max_x = w as isize - 1;
    let max_y = h as isize - 1;

    let mut out = vec![0.0f32; pixels.len()];
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 - cx - t.shift_x;
            let dy = y as f32 - cy - t.shift_y;
            let sx = inv_a * dx + inv_b * dy + cx;
            let sy = inv_c * dx + inv_d * dy + cy;

            let x0 = sx.floor();
            let y0 = sy.floor();
            let fx = sx - x0;
            let fy = sy - y0;
            let x0c = (x0 as isize).clamp(0, max_x) as usize;
            let x1c = (x0 as isize + 1).clamp(0, max_x) as usize;
            let y0c = (y0 as isize).clamp(0, max_y) as usize;
            let y1c = (y0 as isize + 1).clamp(0, max_y) as usize;

            for ch in 0..CHANNELS {
                let plane = ch * w * h;
                let p00 = pixels[plane + y0c * w + x0c];
                let p01 = pixels[plane + y0c * w + x1c];
                let p10 = pixels[plane + y1c * w + x0c];
                let p11 = pixels[plane + y1c * w + x1c];
                let top = p00 + (p01 - p00) * fx;
                let bottom = p10 + (p11 - p10) * fx;
                out[plane + y * w + x] = top + (bottom - top) * fy;
            }
        }
    }
    out
}

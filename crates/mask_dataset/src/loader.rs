//! Directory-per-category image ingestion.

use image::imageops::FilterType;
use rayon::prelude::*;
use std::fs;
use std::path::Path;

use crate::types::{
    DatasetError, DatasetResult, ImageTensor, CHANNELS, IMAGE_SIZE, PIXELS_PER_IMAGE,
};

/// Decode one file into a normalized CHW tensor.
///
/// The image is converted to RGB, resized to [`IMAGE_SIZE`]² with a triangle
/// filter, and every byte mapped to [-1, 1] via `x / 127.5 - 1`.
pub fn load_image(path: &Path) -> DatasetResult<ImageTensor> {
    let img = image::open(path)
        .map_err(|e| DatasetError::Image {
            path: path.to_path_buf(),
            source: e,
        })?
        .to_rgb8();
    let resized = image::imageops::resize(
        &img,
        IMAGE_SIZE as u32,
        IMAGE_SIZE as u32,
        FilterType::Triangle,
    );
    let mut pixels = vec![0.0f32; PIXELS_PER_IMAGE];
    for (x, y, px) in resized.enumerate_pixels() {
        for ch in 0..CHANNELS {
            pixels[ch * IMAGE_SIZE * IMAGE_SIZE + y as usize * IMAGE_SIZE + x as usize] =
                px.0[ch] as f32 / 127.5 - 1.0;
        }
    }
    Ok(ImageTensor { pixels })
}

/// Walk `root/<category>/` for each listed category and load every image.
///
/// Returns parallel (images, labels) with matching indices; files within a
/// category are visited in sorted path order. Any unreadable or undecodable
/// file aborts the whole load; a partial dataset would silently skew the
/// split proportions downstream. Hidden files are ignored.
pub fn load_directory(
    root: &Path,
    categories: &[String],
) -> DatasetResult<(Vec<ImageTensor>, Vec<String>)> {
    let mut images = Vec::new();
    let mut labels = Vec::new();
    for category in categories {
        let dir = root.join(category);
        let entries = fs::read_dir(&dir).map_err(|e| DatasetError::Io {
            path: dir.clone(),
            source: e,
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| DatasetError::Io {
                    path: dir.clone(),
                    source: e,
                })?
                .path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if path.is_file() && !hidden {
                files.push(path);
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(DatasetError::EmptyCategory { path: dir });
        }

        let decoded = files
            .par_iter()
            .map(|path| load_image(path))
            .collect::<DatasetResult<Vec<ImageTensor>>>()?;
        images.extend(decoded);
        labels.extend(files.iter().map(|_| category.clone()));
    }
    Ok((images, labels))
}

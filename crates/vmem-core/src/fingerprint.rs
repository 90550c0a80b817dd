//! Image fingerprinting.
//!
//! Three fingerprints are derived from the same bytes:
//! - **content**: SHA-256 of the raw file bytes, the exact-duplicate key
//! - **perceptual**: 64-bit DCT hash, tolerant to resizing and recompression
//! - **structural**: SHA-256 of a 32x32 grayscale grid (layout summary)

use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, GrayImage, Luma};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::FingerprintSet;

/// Side of the grid the DCT runs over.
const DCT_SIZE: usize = 32;
/// Side of the low-frequency block kept from the DCT.
const HASH_SIZE: usize = 8;
/// Side of the grayscale grid behind the structural hash.
const STRUCTURAL_SIZE: u32 = 32;

/// Computes [`FingerprintSet`]s from encoded image bytes.
pub struct Fingerprinter;

impl Fingerprinter {
    /// Fingerprint an image file.
    pub fn fingerprint_file(path: &Path) -> Result<FingerprintSet> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::unreadable(format!("{}: {}", path.display(), e)))?;
        Self::fingerprint(&bytes)
    }

    /// Fingerprint encoded image bytes.
    pub fn fingerprint(bytes: &[u8]) -> Result<FingerprintSet> {
        let image = image::load_from_memory(bytes).map_err(Error::unreadable)?;
        let gray = to_luma(&image);

        let set = FingerprintSet {
            content_hash: content_hash(bytes),
            perceptual_hash: perceptual_hash(&gray),
            structural_hash: structural_hash(&gray),
            width: image.width(),
            height: image.height(),
            color_mode: color_mode(image.color()),
        };

        debug!(
            content_hash = %set.content_hash,
            perceptual_hash = %set.perceptual_hash,
            width = set.width,
            height = set.height,
            "Fingerprinted image"
        );

        Ok(set)
    }
}

/// SHA-256 of raw bytes as lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// DCT-based perceptual hash of a grayscale image, as 16 hex characters.
pub fn perceptual_hash(gray: &GrayImage) -> String {
    let small = imageops::resize(gray, DCT_SIZE as u32, DCT_SIZE as u32, FilterType::Lanczos3);
    let pixels: Vec<f64> = small.as_raw().iter().map(|&p| p as f64).collect();

    let low = low_frequency_dct(&pixels);

    let mut sorted = low.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

    let bits = low.iter().fold(0u64, |acc, &coefficient| {
        (acc << 1) | u64::from(coefficient > median)
    });

    format!("{:016x}", bits)
}

/// SHA-256 over a 32x32 grayscale grid.
pub fn structural_hash(gray: &GrayImage) -> String {
    let grid = imageops::resize(gray, STRUCTURAL_SIZE, STRUCTURAL_SIZE, FilterType::CatmullRom);
    content_hash(grid.as_raw())
}

/// Top-left `HASH_SIZE` x `HASH_SIZE` block of the 2-D DCT-II, row-major.
fn low_frequency_dct(pixels: &[f64]) -> Vec<f64> {
    let n = DCT_SIZE;
    let mut cosines = vec![0.0f64; HASH_SIZE * n];
    for k in 0..HASH_SIZE {
        for i in 0..n {
            cosines[k * n + i] =
                (std::f64::consts::PI * k as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos();
        }
    }

    // Transform along each row first, keeping only the low horizontal frequencies.
    let mut rows = vec![0.0f64; n * HASH_SIZE];
    for y in 0..n {
        for v in 0..HASH_SIZE {
            rows[y * HASH_SIZE + v] = (0..n)
                .map(|x| pixels[y * n + x] * cosines[v * n + x])
                .sum::<f64>()
                * 2.0;
        }
    }

    let mut block = vec![0.0f64; HASH_SIZE * HASH_SIZE];
    for u in 0..HASH_SIZE {
        for v in 0..HASH_SIZE {
            block[u * HASH_SIZE + v] = (0..n)
                .map(|y| rows[y * HASH_SIZE + v] * cosines[u * n + y])
                .sum::<f64>()
                * 2.0;
        }
    }
    block
}

/// 8-bit luma using ITU-R 601 weights.
fn to_luma(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let l = (u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000) >> 16;
        Luma([l as u8])
    })
}

fn color_mode(color: ColorType) -> String {
    match color {
        ColorType::L8 => "L".to_string(),
        ColorType::La8 => "LA".to_string(),
        ColorType::Rgb8 => "RGB".to_string(),
        ColorType::Rgba8 => "RGBA".to_string(),
        ColorType::L16 => "I;16".to_string(),
        ColorType::La16 => "LA;16".to_string(),
        ColorType::Rgb16 => "RGB;16".to_string(),
        ColorType::Rgba16 => "RGBA;16".to_string(),
        ColorType::Rgb32F => "RGB;F".to_string(),
        ColorType::Rgba32F => "RGBA;F".to_string(),
        other => format!("{:?}", other),
    }
}

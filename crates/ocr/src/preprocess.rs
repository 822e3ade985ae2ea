use image::{DynamicImage, GrayImage, Luma, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::encode::{self, EncodeError, PNG_MIME};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to decode image: {0}")]
    Format(#[from] image::ImageError),
    #[error("Image has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

// ── Rasters ──────────────────────────────────────────────────────────────────

/// An RGB photo decoded from uploaded bytes. Always has non-zero dimensions.
#[derive(Debug, Clone)]
pub struct SourceImage(RgbImage);

impl SourceImage {
    /// Decode JPEG / PNG / WEBP / … bytes, dropping alpha and palette.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let img = image::load_from_memory(data)?;
        Self::from_rgb(img.to_rgb8())
    }

    pub fn from_rgb(rgb: RgbImage) -> Result<Self, DecodeError> {
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::Empty { width, height });
        }
        Ok(Self(rgb))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.0
    }
}

impl From<&NormalizedImage> for SourceImage {
    fn from(img: &NormalizedImage) -> Self {
        SourceImage(DynamicImage::ImageLuma8(img.0.clone()).to_rgb8())
    }
}

/// Output of [`preprocess`]: same size as its source, every pixel 0 or 255.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage(GrayImage);

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_gray(self) -> GrayImage {
        self.0
    }

    pub fn to_png(&self) -> Result<Vec<u8>, EncodeError> {
        encode::encode_png(&self.0)
    }

    /// PNG-encode and wrap as `data:image/png;base64,...`.
    pub fn to_data_url(&self) -> Result<String, EncodeError> {
        Ok(encode::data_url(PNG_MIME, &self.to_png()?))
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// Grayscale → 3×3 Gaussian blur → Otsu binarization.
pub fn preprocess(source: &SourceImage) -> NormalizedImage {
    let gray = to_grayscale(&source.0);
    let smoothed = gaussian_blur_3x3(&gray);
    let threshold = otsu_threshold(&smoothed);
    debug!(
        width = source.width(),
        height = source.height(),
        threshold,
        "binarizing receipt image"
    );
    NormalizedImage(binarize(&smoothed, threshold))
}

/// Decode raw upload bytes and run [`preprocess`].
pub fn preprocess_bytes(data: &[u8]) -> Result<NormalizedImage, DecodeError> {
    let source = SourceImage::decode(data)?;
    Ok(preprocess(&source))
}

// ── Steps ────────────────────────────────────────────────────────────────────

// BT.601 luma weights in 14-bit fixed point; they sum to 1 << 14.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

pub fn to_grayscale(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B;
        Luma([((luma + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8])
    })
}

const BLUR_KERNEL: [u32; 3] = [1, 2, 1];

/// 3×3 binomial blur (`[1 2 1] ⊗ [1 2 1] / 16`) with reflect-101 borders.
pub fn gaussian_blur_3x3(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let xs = [
            reflect_101(x as i64 - 1, width),
            x,
            reflect_101(x as i64 + 1, width),
        ];
        let ys = [
            reflect_101(y as i64 - 1, height),
            y,
            reflect_101(y as i64 + 1, height),
        ];

        let mut acc = 0u32;
        for (ky, &sy) in ys.iter().enumerate() {
            for (kx, &sx) in xs.iter().enumerate() {
                acc += BLUR_KERNEL[ky] * BLUR_KERNEL[kx] * gray.get_pixel(sx, sy)[0] as u32;
            }
        }
        Luma([((acc + 8) >> 4) as u8])
    })
}

/// Mirror an out-of-range index without repeating the edge: -1 → 1, len → len - 2.
fn reflect_101(i: i64, len: u32) -> u32 {
    let len = len as i64;
    if len == 1 {
        return 0;
    }
    let r = if i < 0 {
        -i
    } else if i >= len {
        2 * len - 2 - i
    } else {
        i
    };
    r as u32
}

/// Otsu's method: the lowest `t` maximizing between-class variance for the
/// split `{<= t}` / `{> t}`. A single-valued image yields 0.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p[0] as usize] += 1;
    }
    let total = gray.width() as u64 * gray.height() as u64;
    threshold_from_histogram(&histogram, total)
}

fn threshold_from_histogram(histogram: &[u64; 256], total: u64) -> u8 {
    if total == 0 {
        return 0;
    }

    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_b = 0.0f64;
    let mut w_b = 0u64;
    let mut max_variance = 0.0f64;
    let mut threshold = 0u8;

    for (t, &count) in histogram.iter().enumerate() {
        w_b += count;
        if w_b == 0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f == 0 {
            break;
        }

        sum_b += t as f64 * count as f64;
        let m_b = sum_b / w_b as f64;
        let m_f = (sum_total - sum_b) / w_f as f64;

        let variance = w_b as f64 * w_f as f64 * (m_b - m_f).powi(2);
        if variance > max_variance {
            max_variance = variance;
            threshold = t as u8;
        }
    }

    threshold
}

/// Pixels above `threshold` become 255, the rest 0.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([if gray.get_pixel(x, y)[0] > threshold { 255 } else { 0 }])
    })
}

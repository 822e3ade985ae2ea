//! Lossless re-encoding of processed images for transport.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

pub const PNG_MIME: &str = "image/png";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to encode processed image: {0}")]
    Png(#[from] image::ImageError),
}

/// Encode a single-channel raster as PNG bytes.
pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Wrap binary data in a `data:<mime>;base64,...` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
}

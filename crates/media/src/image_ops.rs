//! Image normalization for stored chat attachments.
//!
//! Inbound images wider than the configured maximum are downscaled (aspect
//! preserved, never upscaled) and recompressed to JPEG; stickers are always
//! rasterized to PNG so every client can render them.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};

use crate::error::{Error, Result};

/// Result of a width-clamping recompression.
#[derive(Debug)]
pub struct Recompressed {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

fn decode(data: &[u8]) -> Result<DynamicImage> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| Error::external("guess image format", e))?
        .decode()
        .map_err(|e| Error::external("decode image", e))
}

/// Pixel dimensions of an encoded image, without a full decode.
pub fn dimensions(data: &[u8]) -> Result<(u32, u32)> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| Error::external("guess image format", e))?
        .into_dimensions()
        .map_err(|e| Error::external("read image dimensions", e))
}

/// Downscale an image so its width equals `max_width`, preserving aspect
/// ratio, and recompress as JPEG at `quality`.
///
/// Returns `None` when the image is already narrow enough — the original
/// bytes should be stored untouched. Images are never upscaled.
pub fn clamp_width(data: &[u8], max_width: u32, quality: u8) -> Result<Option<Recompressed>> {
    let (width, height) = dimensions(data)?;
    if width <= max_width {
        return Ok(None);
    }

    let img = decode(data)?;
    let new_height = ((height as f64) * (max_width as f64) / (width as f64)).round() as u32;
    let resized = img.resize(max_width, new_height.max(1), image::imageops::FilterType::Lanczos3);
    let (final_width, final_height) = resized.dimensions();

    // JPEG has no alpha channel; flatten before encoding.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut output = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| Error::external("encode resized image", e))?;

    Ok(Some(Recompressed {
        data: output.into_inner(),
        mime_type: "image/jpeg",
        width: final_width,
        height: final_height,
    }))
}

/// Re-encode any raster image as PNG (sticker normalization).
pub fn to_png(data: &[u8]) -> Result<Vec<u8>> {
    let img = decode(data)?;
    let mut output = Cursor::new(Vec::new());
    img.write_to(&mut output, ImageFormat::Png)
        .map_err(|e| Error::external("encode png", e))?;
    Ok(output.into_inner())
}

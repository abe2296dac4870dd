//! Image decoding and encoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) on the way in and
//! produces PNG or JPEG bytes on the way out.

use image::{DynamicImage, GrayImage, ImageEncoder, RgbaImage};

use crate::types::{Dimensions, OutputFormat, PipelineError};

/// Decode raw image bytes into an RGBA buffer.
///
/// Supports PNG, JPEG, BMP, and WebP formats (whatever the `image` crate
/// was built with).
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
/// Returns [`PipelineError::EmptySource`] if the image has no pixels.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?.to_rgba8();
    let size = Dimensions::new(img.width(), img.height());
    if size.is_empty() {
        return Err(PipelineError::EmptySource(size));
    }
    Ok(img)
}

/// Luminance copy of an RGBA image, as feature detectors expect.
///
/// Reads the source in place; only the one-channel output is allocated.
#[must_use]
pub fn to_gray(image: &RgbaImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Encode `image` in `format`.
///
/// A zero-area image encodes to an empty byte vector; neither PNG nor
/// JPEG can represent it.
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if the encoder rejects the
/// buffer.
pub fn encode(image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>, PipelineError> {
    if image.width() == 0 || image.height() == 0 {
        return Ok(Vec::new());
    }

    let mut buf = Vec::new();
    match format {
        OutputFormat::Png => {
            let encoder = image::codecs::png::PngEncoder::new(&mut buf);
            encoder
                .write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ExtendedColorType::Rgba8,
                )
                .map_err(PipelineError::ImageEncode)?;
        }
        OutputFormat::Jpeg { quality } => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
            encoder
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(PipelineError::ImageEncode)?;
        }
    }
    Ok(buf)
}

use base64::{engine::general_purpose, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::core::errors::{CompressionError, CompressionResult};

/// Encode bytes as a `data:` URL
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

/// Split a base64 `data:` URL into its MIME type and decoded bytes.
pub fn decode_data_url(data_url: &str) -> CompressionResult<(String, Vec<u8>)> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| CompressionError::InvalidDataUrl("missing data: scheme".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| CompressionError::InvalidDataUrl("missing ',' separator".to_string()))?;

    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| CompressionError::InvalidDataUrl("only base64 payloads are supported".to_string()))?;

    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| CompressionError::InvalidDataUrl(e.to_string()))?;

    Ok((mime.to_string(), bytes))
}

/// Estimated byte size of the image behind a base64 data URL
pub fn estimated_size(data_url: &str) -> usize {
    (data_url.len() * 3).div_ceil(4)
}

/// MIME type of encoded image bytes, if the format is recognized
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

pub fn is_jpeg(bytes: &[u8]) -> bool {
    matches!(image::guess_format(bytes), Ok(ImageFormat::Jpeg))
}

pub fn decode_image(bytes: &[u8]) -> CompressionResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(CompressionError::Decode)
}

/// Render `img` onto an opaque RGB surface of the given size.
///
/// JPEG has no alpha channel, so transparent pixels end up black.
pub fn render_rgb(img: &DynamicImage, width: u32, height: u32) -> CompressionResult<RgbImage> {
    if width == 0 || height == 0 {
        return Err(CompressionError::SurfaceUnavailable { width, height });
    }

    if img.width() == width && img.height() == height {
        Ok(img.to_rgb8())
    } else {
        Ok(img.resize_exact(width, height, FilterType::Triangle).to_rgb8())
    }
}

/// Encode an RGB surface as baseline JPEG at `quality` in 1..=100
pub fn encode_jpeg(surface: &RgbImage, quality: u8) -> CompressionResult<Vec<u8>> {
    let mut jpeg_bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg_bytes, quality.clamp(1, 100));
    surface
        .write_with_encoder(encoder)
        .map_err(CompressionError::Encoding)?;
    Ok(jpeg_bytes)
}

//! Adaptive JPEG compression for captured food photos.
//!
//! The compressor bounds the long edge to [`MAX_LONG_EDGE`] pixels and then binary-searches
//! the JPEG quality inside [`MIN_QUALITY`]..=[`MAX_QUALITY`] so the encoded data URL lands
//! close to (and preferably under) a byte budget. The search is bounded to
//! [`MAX_ITERATIONS`] encodes, which keeps latency predictable for a single photo.

use image::{DynamicImage, RgbImage};
use tracing::{debug, instrument};

use crate::core::errors::{CompressionError, CompressionResult};
use crate::utils::image_ops::{
    decode_data_url, decode_image, encode_data_url, encode_jpeg, estimated_size, is_jpeg, render_rgb,
};

pub const MAX_LONG_EDGE: u32 = 1200;
pub const MIN_QUALITY: f64 = 0.5;
pub const MAX_QUALITY: f64 = 0.9;
pub const MAX_ITERATIONS: u32 = 5;
/// Distance from the target at which the search accepts an encoding
pub const SIZE_TOLERANCE_BYTES: usize = 1024;
/// Narrowest quality interval worth splitting again
pub const MIN_QUALITY_SPAN: f64 = 0.01;

const JPEG_MIME: &str = "image/jpeg";

/// A size-bounded JPEG and its data URL
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    /// Quality used for the returned encoding; `None` when the source JPEG was kept as-is
    pub quality: Option<f64>,
    /// Number of quality-search encodes performed
    pub iterations: u32,
}

impl CompressedImage {
    pub fn estimated_size(&self) -> usize {
        estimated_size(&self.data_url)
    }
}

/// Output dimensions: the long edge is scaled down to [`MAX_LONG_EDGE`], never up.
pub fn target_dimensions(width: u32, height: u32) -> (u32, u32) {
    let limit = MAX_LONG_EDGE as f64;

    if width > height && width > MAX_LONG_EDGE {
        let scaled = (height as f64 * limit / width as f64).round() as u32;
        (MAX_LONG_EDGE, scaled.max(1))
    } else if height > MAX_LONG_EDGE {
        let scaled = (width as f64 * limit / height as f64).round() as u32;
        (scaled.max(1), MAX_LONG_EDGE)
    } else {
        (width, height)
    }
}

fn quality_to_jpeg(quality: f64) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

struct Attempt {
    bytes: Vec<u8>,
    data_url: String,
    quality: f64,
    size: usize,
}

fn encode_attempt(surface: &RgbImage, quality: f64) -> CompressionResult<Attempt> {
    let bytes = encode_jpeg(surface, quality_to_jpeg(quality))?;
    let data_url = encode_data_url(JPEG_MIME, &bytes);
    let size = estimated_size(&data_url);
    Ok(Attempt {
        bytes,
        data_url,
        quality,
        size,
    })
}

/// Compress a decoded image to a JPEG data URL close to `target_bytes`.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn compress(image: &DynamicImage, target_bytes: usize) -> CompressionResult<CompressedImage> {
    let (width, height) = target_dimensions(image.width(), image.height());
    let surface = render_rgb(image, width, height)?;

    // Returned as-is when no search step fits the budget
    let initial = encode_attempt(&surface, MAX_QUALITY)?;

    let mut min_quality = MIN_QUALITY;
    let mut max_quality = MAX_QUALITY;
    let mut best_fit: Option<Attempt> = None;
    let mut accepted: Option<Attempt> = None;
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS {
        let mid_quality = (min_quality + max_quality) / 2.0;
        let attempt = encode_attempt(&surface, mid_quality)?;
        let size = attempt.size;
        iterations += 1;

        debug!(
            "Quality {:.3} -> ~{} bytes (target {}, interval [{:.3}, {:.3}])",
            mid_quality, size, target_bytes, min_quality, max_quality
        );

        if size.abs_diff(target_bytes) < SIZE_TOLERANCE_BYTES
            || max_quality - min_quality < MIN_QUALITY_SPAN
        {
            accepted = Some(attempt);
            break;
        }

        if size > target_bytes {
            max_quality = mid_quality;
        } else {
            min_quality = mid_quality;
            best_fit = Some(attempt);
        }
    }

    let chosen = accepted.or(best_fit).unwrap_or(initial);

    debug!(
        "Compressed {}x{} -> {}x{} at quality {:.3} (~{} bytes, {} iterations)",
        image.width(),
        image.height(),
        width,
        height,
        chosen.quality,
        chosen.size,
        iterations
    );

    Ok(CompressedImage {
        bytes: chosen.bytes,
        data_url: chosen.data_url,
        width,
        height,
        quality: Some(chosen.quality),
        iterations,
    })
}

/// Decode encoded image bytes and compress them.
///
/// A source that is already a JPEG within the size and dimension limits is never replaced by
/// a larger re-encoding.
pub fn compress_bytes(bytes: &[u8], target_bytes: usize) -> CompressionResult<CompressedImage> {
    let image = decode_image(bytes)?;
    let compressed = compress(&image, target_bytes)?;

    let untouched_dims = (compressed.width, compressed.height) == (image.width(), image.height());
    if is_jpeg(bytes) && untouched_dims && bytes.len() <= target_bytes && compressed.bytes.len() > bytes.len() {
        debug!(
            "Keeping source JPEG ({} bytes) over larger re-encode ({} bytes)",
            bytes.len(),
            compressed.bytes.len()
        );
        return Ok(CompressedImage {
            data_url: encode_data_url(JPEG_MIME, bytes),
            bytes: bytes.to_vec(),
            width: image.width(),
            height: image.height(),
            quality: None,
            iterations: compressed.iterations,
        });
    }

    Ok(compressed)
}

/// `compress(dataUrl, target)`: decode a data URL and return a compressed JPEG data URL.
pub fn compress_data_url(data_url: &str, target_bytes: usize) -> CompressionResult<CompressedImage> {
    let (_mime, bytes) = decode_data_url(data_url)?;
    compress_bytes(&bytes, target_bytes)
}

/// Asynchronously compress encoded image bytes using spawn_blocking.
pub async fn compress_bytes_async(bytes: Vec<u8>, target_bytes: usize) -> CompressionResult<CompressedImage> {
    tokio::task::spawn_blocking(move || compress_bytes(&bytes, target_bytes))
        .await
        .map_err(|e| CompressionError::TaskJoinFailed(e.to_string()))?
}

/// Asynchronously compress an already decoded image using spawn_blocking.
pub async fn compress_image_async(image: DynamicImage, target_bytes: usize) -> CompressionResult<CompressedImage> {
    tokio::task::spawn_blocking(move || compress(&image, target_bytes))
        .await
        .map_err(|e| CompressionError::TaskJoinFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DEFAULT_TARGET_BYTES;
    use image::{Rgb, RgbImage};

    /// Busy pattern so JPEG size actually depends on quality
    fn textured(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(37) ^ y.wrapping_mul(91)).wrapping_mul(2654435761) >> 24;
            Rgb([v as u8, (x * 7 + y) as u8, (y * 13) as u8])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_small_images_keep_dimensions() {
        for (w, h) in [(1, 1), (640, 480), (1200, 1200), (1200, 300), (300, 1200), (1199, 1)] {
            assert_eq!(target_dimensions(w, h), (w, h), "{}x{}", w, h);
        }
    }

    #[test]
    fn test_large_images_scale_long_edge_to_limit() {
        assert_eq!(target_dimensions(2400, 1800), (1200, 900));
        assert_eq!(target_dimensions(1800, 2400), (900, 1200));
        assert_eq!(target_dimensions(4000, 4000), (1200, 1200));
        assert_eq!(target_dimensions(1201, 1), (1200, 1));
        // 3000x1 would round the short side to 0
        assert_eq!(target_dimensions(3000, 1), (1200, 1));

        let (w, h) = target_dimensions(4032, 3024);
        assert_eq!(w, 1200);
        let ratio_in = 4032.0 / 3024.0;
        let ratio_out = w as f64 / h as f64;
        assert!((ratio_in - ratio_out).abs() < 0.01);
    }

    #[test]
    fn test_search_stays_in_bounds_and_terminates() {
        let image = textured(320, 240);
        for target in [1, 5_000, 20_000, DEFAULT_TARGET_BYTES] {
            let out = compress(&image, target).unwrap();
            let q = out.quality.unwrap();
            assert!((MIN_QUALITY..=MAX_QUALITY).contains(&q), "quality {} for target {}", q, target);
            assert!(out.iterations >= 1 && out.iterations <= MAX_ITERATIONS);
            assert!(out.data_url.starts_with("data:image/jpeg;base64,"));
        }
    }

    #[test]
    fn test_generous_budget_searches_upward() {
        let out = compress(&textured(64, 64), DEFAULT_TARGET_BYTES).unwrap();
        // Every attempt fits, so the lower bound climbs on each iteration
        assert_eq!(out.iterations, MAX_ITERATIONS);
        assert!(out.quality.unwrap() > 0.85);
        assert!(out.estimated_size() <= DEFAULT_TARGET_BYTES);
    }

    #[test]
    fn test_unreachable_budget_falls_back_to_max_quality() {
        let out = compress(&textured(200, 200), 10).unwrap();
        // Every search step exceeds the target, so the initial max-quality encoding is kept
        assert_eq!(out.quality, Some(MAX_QUALITY));
        assert_eq!(out.iterations, MAX_ITERATIONS);

        let surface = render_rgb(&textured(200, 200), 200, 200).unwrap();
        let reference = encode_jpeg(&surface, quality_to_jpeg(MAX_QUALITY)).unwrap();
        assert_eq!(out.bytes, reference);
    }

    #[test]
    fn test_large_image_is_downscaled() {
        let out = compress(&textured(2400, 600), DEFAULT_TARGET_BYTES).unwrap();
        assert_eq!((out.width, out.height), (1200, 300));

        let decoded = decode_image(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1200, 300));
    }

    #[test]
    fn test_recompressing_does_not_grow() {
        let first = compress(&textured(300, 200), 12_000).unwrap();
        let second = compress_bytes(&first.bytes, DEFAULT_TARGET_BYTES).unwrap();
        assert!(second.bytes.len() <= first.bytes.len());

        let third = compress_data_url(&second.data_url, DEFAULT_TARGET_BYTES).unwrap();
        assert!(third.bytes.len() <= second.bytes.len());
    }

    #[test]
    fn test_undecodable_input_is_decode_error() {
        let err = compress_bytes(b"definitely not an image", DEFAULT_TARGET_BYTES).unwrap_err();
        assert!(matches!(err, CompressionError::Decode(_)));
        assert!(!err.is_encoding_error());

        let err = compress_data_url("not a data url", DEFAULT_TARGET_BYTES).unwrap_err();
        assert!(matches!(err, CompressionError::InvalidDataUrl(_)));
    }

    #[tokio::test]
    async fn test_compress_async_matches_sync_dimensions() {
        let out = compress_image_async(textured(1500, 300), DEFAULT_TARGET_BYTES)
            .await
            .unwrap();
        assert_eq!((out.width, out.height), (1200, 240));
    }
}

// Capture sources: a camera frame snapshot or a user-selected file
//
// Camera lifecycle lives outside the crate; this module only consumes the pixels or bytes
// it is handed and turns them into a data URL ready for analysis.

use image::{DynamicImage, RgbaImage};
use tracing::{debug, info};

use crate::core::errors::{CompressionError, CompressionResult};
use crate::services::compression::{compress_bytes_async, compress_image_async};
use crate::utils::image_ops::{encode_data_url, sniff_mime};

/// Raw RGBA8 pixels grabbed from a live frame
#[derive(Debug, Clone)]
pub struct RawImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RawImage {
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> CompressionResult<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(CompressionError::InvalidFrame {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn into_dynamic(self) -> CompressionResult<DynamicImage> {
        let (width, height, len) = (self.width, self.height, self.pixels.len());
        RgbaImage::from_raw(width, height, self.pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or(CompressionError::InvalidFrame { width, height, len })
    }
}

/// Where a capture came from
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// One frame from an active camera stream
    FrameSnapshot(RawImage),
    /// Encoded image bytes from a user-supplied file
    FileImage { bytes: Vec<u8>, file_name: String },
}

impl CaptureSource {
    pub fn file(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        CaptureSource::FileImage {
            bytes,
            file_name: file_name.into(),
        }
    }

    /// Size of the capture as handed over (raw buffer or file)
    pub fn original_size(&self) -> usize {
        match self {
            CaptureSource::FrameSnapshot(raw) => raw.pixels.len(),
            CaptureSource::FileImage { bytes, .. } => bytes.len(),
        }
    }
}

/// Image ready to send for analysis
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub data_url: String,
    pub original_size: usize,
    /// Whether the compressor ran; small files bypass it
    pub compressed: bool,
}

/// Turn a capture into a data URL, compressing when it is a frame or the file exceeds
/// `target_bytes`.
pub async fn prepare_capture(source: CaptureSource, target_bytes: usize) -> CompressionResult<CapturedImage> {
    let original_size = source.original_size();

    match source {
        CaptureSource::FrameSnapshot(raw) => {
            debug!("Compressing {}x{} camera frame", raw.width(), raw.height());
            let image = raw.into_dynamic()?;
            let compressed = compress_image_async(image, target_bytes).await?;
            info!(
                "Frame compressed to {}x{} (~{} bytes)",
                compressed.width,
                compressed.height,
                compressed.estimated_size()
            );
            Ok(CapturedImage {
                data_url: compressed.data_url,
                original_size,
                compressed: true,
            })
        }
        CaptureSource::FileImage { bytes, file_name } => {
            if bytes.len() > target_bytes {
                info!(
                    "File {} is {} bytes (> {}), compressing",
                    file_name,
                    bytes.len(),
                    target_bytes
                );
                let compressed = compress_bytes_async(bytes, target_bytes).await?;
                Ok(CapturedImage {
                    data_url: compressed.data_url,
                    original_size,
                    compressed: true,
                })
            } else {
                let mime = sniff_mime(&bytes).ok_or(CompressionError::UnsupportedFormat(file_name))?;
                debug!("File is under budget, sending as {}", mime);
                Ok(CapturedImage {
                    data_url: encode_data_url(mime, &bytes),
                    original_size,
                    compressed: false,
                })
            }
        }
    }
}

// Error types for the capture, analysis and proxy paths
//
// thiserror enums per concern, chained with #[from]/#[source]; binaries wrap them in anyhow.

use thiserror::Error;

/// Image compression and capture errors
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Malformed data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Cannot create rendering surface of {width}x{height}")]
    SurfaceUnavailable { width: u32, height: u32 },

    #[error("JPEG encoding failed: {0}")]
    Encoding(#[source] image::ImageError),

    #[error("Frame buffer of {len} bytes does not match {width}x{height} RGBA")]
    InvalidFrame { width: u32, height: u32, len: usize },

    #[error("Unsupported image format for file {0}")]
    UnsupportedFormat(String),

    #[error("Compression task failed: {0}")]
    TaskJoinFailed(String),
}

impl CompressionError {
    /// True for failures caused by the encoding side rather than the source image
    pub fn is_encoding_error(&self) -> bool {
        matches!(
            self,
            CompressionError::SurfaceUnavailable { .. } | CompressionError::Encoding(_)
        )
    }
}

/// Client-side analysis request errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("Invalid analysis response: {0}")]
    InvalidResponse(String),
}

/// Server-side proxy errors; every variant becomes an HTTP 500
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid analyze request: {0}")]
    InvalidRequest(String),

    #[error("Upstream model is unavailable (circuit open)")]
    CircuitOpen,

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] anyhow::Error),

    #[error("Upstream returned no choices")]
    EmptyReply,
}

/// Capture session misuse
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No captured image to analyze")]
    NoCapture,

    #[error("Capture failed: {0}")]
    Capture(#[from] CompressionError),
}

/// Ingredient table edit errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("Ingredient index {index} out of range (table has {len} rows)")]
    OutOfRange { index: usize, len: usize },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No vision API key configured (set DASHSCOPE_API_KEY environment variable)")]
    MissingApiKey,

    #[error("Invalid server config: {0}")]
    InvalidServerConfig(String),

    #[error("Invalid vision config: {0}")]
    InvalidVisionConfig(String),

    #[error("Compression target must be > 0 bytes, got {0}")]
    InvalidCompressionTarget(usize),
}

pub type CompressionResult<T> = Result<T, CompressionError>;
pub type ClientResult<T> = Result<T, AnalysisError>;
pub type ProxyResult<T> = Result<T, ProxyError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

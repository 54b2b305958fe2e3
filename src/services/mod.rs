pub mod capture;
pub mod compression;
pub mod vision;

// Re-export commonly used services
pub use capture::{prepare_capture, CaptureSource, CapturedImage, RawImage};
pub use compression::{compress, compress_bytes, compress_bytes_async, CompressedImage};
pub use vision::{parse_model_reply, ModelReply, ParseSource, VisionClient};

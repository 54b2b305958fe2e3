pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{decode_data_url, encode_data_url, estimated_size};
pub use metrics::Metrics;

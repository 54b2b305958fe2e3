pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    AnalysisError, CompressionError, ConfigError, EditError, ProxyError, SessionError,
};
pub use types::{AnalysisResult, AnalyzeRequest, ErrorBody, Ingredient, ANALYSIS_FAILED_MESSAGE};

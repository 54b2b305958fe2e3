// Library exports for the food photo analysis workflow

pub mod client;
pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod server;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{AnalysisError, CompressionError, ConfigError, EditError, ProxyError, SessionError},
    types::{AnalysisResult, AnalyzeRequest, Ingredient},
};

pub use client::AnalysisClient;

pub use middleware::{BreakerPolicy, CircuitBreaker, CircuitState};

pub use orchestration::{AnalysisStatus, CaptureSession, IngredientField, IngredientTable, ResultsView};

pub use server::{build_router, AppState};

pub use services::{CaptureSource, CapturedImage, CompressedImage, RawImage, VisionClient};

pub use utils::Metrics;

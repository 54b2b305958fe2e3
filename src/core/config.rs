use crate::core::errors::ConfigError;
use std::env;
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    /// Maximum accepted request body (data URLs are ~4/3 of the image size)
    pub max_body_bytes: usize,
}

/// Vision-language model configuration
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

/// Client-side compression configuration
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    pub target_bytes: usize,
}

/// Analysis client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub analyze_endpoint: String,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub compression: CompressionConfig,
    pub client: ClientConfig,
}

pub const DEFAULT_VISION_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_VISION_MODEL: &str = "qwen-vl-plus-2025-01-25";
pub const DEFAULT_TARGET_BYTES: usize = 3 * 1024 * 1024;

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| parse_level(&s))
            .unwrap_or(Level::INFO);

        Self {
            server: ServerConfig {
                port: env_or("SERVER_PORT", 3000),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
                max_body_bytes: env_or("MAX_BODY_BYTES", 16 * 1024 * 1024),
            },
            vision: VisionConfig {
                api_key: env::var("DASHSCOPE_API_KEY")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                base_url: env::var("VISION_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_VISION_BASE_URL.to_string()),
                model: env::var("VISION_MODEL").unwrap_or_else(|_| DEFAULT_VISION_MODEL.to_string()),
                timeout_seconds: env_or("API_TIMEOUT_SECONDS", 60),
                max_retries: env_or("MAX_RETRIES", 2),
            },
            compression: CompressionConfig {
                target_bytes: env_or("COMPRESSION_TARGET_BYTES", DEFAULT_TARGET_BYTES),
            },
            client: ClientConfig {
                analyze_endpoint: env::var("ANALYZE_ENDPOINT")
                    .unwrap_or_else(|_| "http://127.0.0.1:3000/api/analyze-food".to_string()),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "max_body_bytes must be > 0".to_string(),
            ));
        }

        if !self.vision.base_url.starts_with("http://") && !self.vision.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidVisionConfig(format!(
                "base_url must be an http(s) URL, got {}",
                self.vision.base_url
            )));
        }

        if self.vision.timeout_seconds == 0 {
            return Err(ConfigError::InvalidVisionConfig(
                "timeout_seconds must be > 0".to_string(),
            ));
        }

        if self.compression.target_bytes == 0 {
            return Err(ConfigError::InvalidCompressionTarget(self.compression.target_bytes));
        }

        Ok(())
    }

    /// The proxy cannot start without a model credential; the CLI client does not need one.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.vision.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn max_body_bytes(&self) -> usize {
        self.server.max_body_bytes
    }

    pub fn vision_model(&self) -> &str {
        &self.vision.model
    }

    pub fn vision_base_url(&self) -> &str {
        self.vision.base_url.trim_end_matches('/')
    }

    pub fn vision_timeout(&self) -> Duration {
        Duration::from_secs(self.vision.timeout_seconds)
    }

    pub fn max_retries(&self) -> u32 {
        self.vision.max_retries
    }

    pub fn compression_target_bytes(&self) -> usize {
        self.compression.target_bytes
    }

    pub fn analyze_endpoint(&self) -> &str {
        &self.client.analyze_endpoint
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// `tracing_subscriber` filter directive for this crate at the configured level
pub fn log_filter(level: Level) -> String {
    let level = match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    };
    format!("food_lens={},analyze_food={},tower_http=warn", level, level)
}

#[cfg(test)]
impl Config {
    /// Configuration pointing the vision client at a local mock
    pub fn for_tests(base_url: &str) -> Self {
        Self {
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
                log_level: Level::DEBUG,
                max_body_bytes: 16 * 1024 * 1024,
            },
            vision: VisionConfig {
                api_key: Some("test-key".to_string()),
                base_url: base_url.to_string(),
                model: DEFAULT_VISION_MODEL.to_string(),
                timeout_seconds: 5,
                max_retries: 0,
            },
            compression: CompressionConfig {
                target_bytes: DEFAULT_TARGET_BYTES,
            },
            client: ClientConfig {
                analyze_endpoint: "http://127.0.0.1:3000/api/analyze-food".to_string(),
            },
        }
    }
}

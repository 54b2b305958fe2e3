// OpenAI-compatible chat-completion client for the food vision model
//
// Sends one image plus the fixed analysis instruction and returns the raw reply text.
// Retries timeouts, 429 and 5xx with capped exponential backoff and jitter.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{ProxyError, ProxyResult};
use crate::middleware::circuit_breaker::CircuitBreaker;
use crate::utils::Metrics;

const INITIAL_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 8000;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyzes food images. Please provide detailed information about ingredients, including their weights, total calories, and calories per gram.";

pub const USER_INSTRUCTION: &str = r#"请分析图片中的食物，列出所有成分，并为每个成分提供：估计重量（克）、总热量（千卡）、以及单位重量热量（千卡/克）。请以JSON格式返回，格式为：{"ingredients": [{"name": "食材名", "weight": 重量数字, "calories": 总热量数字, "caloriesPerGram": 单位重量热量数字}]}"#;

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Reply text from the model; `None` when the model sent no content
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub content: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Vision-language model client with circuit breaker and metrics
pub struct VisionClient {
    config: Arc<Config>,
    api_key: String,
    http_client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Metrics>,
}

impl VisionClient {
    pub fn new(
        config: Arc<Config>,
        circuit_breaker: Option<CircuitBreaker>,
        metrics: Option<Metrics>,
    ) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        let http_client = reqwest::Client::builder()
            .timeout(config.vision_timeout())
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            api_key,
            http_client,
            circuit_breaker: circuit_breaker.unwrap_or_default(),
            metrics,
        })
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.vision_base_url())
    }

    fn build_request<'a>(&'a self, image_url: &'a str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: self.config.vision_model(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: vec![ContentPart::Text { text: SYSTEM_PROMPT }],
                },
                ChatMessage {
                    role: "user",
                    content: vec![
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: image_url },
                        },
                        ContentPart::Text {
                            text: USER_INSTRUCTION,
                        },
                    ],
                },
            ],
        }
    }

    /// Ask the model to analyze one food image given as a data URL.
    #[instrument(skip(self, image_url), fields(model = %self.config.vision_model()))]
    pub async fn analyze_image(&self, image_url: &str) -> ProxyResult<ModelReply> {
        if !self.circuit_breaker.allow_request() {
            warn!("Circuit breaker is open, failing fast");
            return Err(ProxyError::CircuitOpen);
        }

        let start = Instant::now();
        let result = self.send_with_retries(image_url).await;
        let duration = start.elapsed();

        match result {
            Ok(response) => {
                self.circuit_breaker.record_success();

                let (input_tokens, output_tokens) = response
                    .usage
                    .as_ref()
                    .map(|u| (u.prompt_tokens, u.completion_tokens))
                    .unwrap_or((0, 0));

                if let Some(ref m) = self.metrics {
                    m.record_api_call(true, duration, input_tokens, output_tokens);
                }

                info!(
                    "Model replied in {:.2}s ({} prompt / {} completion tokens)",
                    duration.as_secs_f64(),
                    input_tokens,
                    output_tokens
                );

                let choice = response.choices.into_iter().next().ok_or(ProxyError::EmptyReply)?;
                debug!("Raw model content: {:?}", choice.message.content);

                Ok(ModelReply {
                    content: choice.message.content,
                    input_tokens,
                    output_tokens,
                })
            }
            Err(e) => {
                if self.circuit_breaker.record_failure() {
                    if let Some(ref m) = self.metrics {
                        m.record_circuit_breaker_trip();
                    }
                }
                if let Some(ref m) = self.metrics {
                    m.record_api_call(false, duration, 0, 0);
                }
                Err(ProxyError::Upstream(e))
            }
        }
    }

    async fn send_with_retries(&self, image_url: &str) -> Result<ChatCompletionResponse> {
        let request = self.build_request(image_url);
        let url = self.endpoint();
        let max_retries = self.config.max_retries();
        let mut retry_delay_ms = INITIAL_RETRY_DELAY_MS;
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let jitter = rand::random::<u64>() % 250;
                warn!(
                    "Retrying model request (attempt {}/{}) after {}ms",
                    attempt + 1,
                    max_retries + 1,
                    retry_delay_ms + jitter
                );
                tokio::time::sleep(Duration::from_millis(retry_delay_ms + jitter)).await;
                retry_delay_ms = (retry_delay_ms * 2).min(MAX_RETRY_DELAY_MS);
            }

            let response = match self
                .http_client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    error!(
                        "Model request failed (attempt {}): {} (retryable: {})",
                        attempt + 1,
                        e,
                        retryable
                    );
                    if retryable && attempt < max_retries {
                        last_error = Some(e.into());
                        continue;
                    }
                    return Err(e).context("Failed to send request to vision model");
                }
            };

            let status = response.status();

            if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let error_text = response.text().await.unwrap_or_default();
                error!("Model server error {} (attempt {}): {}", status, attempt + 1, error_text);
                if attempt < max_retries {
                    last_error = Some(anyhow::anyhow!("Vision model error: {} - {}", status, error_text));
                    continue;
                }
                anyhow::bail!("Vision model error after {} attempts: {} - {}", attempt + 1, status, error_text);
            }

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                anyhow::bail!("Vision model error: {} - {}", status, error_text);
            }

            return response
                .json::<ChatCompletionResponse>()
                .await
                .context("Failed to parse chat completion response");
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Vision model request failed after retries")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> VisionClient {
        let config = Arc::new(Config::for_tests("http://127.0.0.1:9/v1"));
        VisionClient::new(config, None, None).unwrap()
    }

    #[test]
    fn test_request_shape_matches_chat_completions() {
        let client = client();
        let request = client.build_request("data:image/jpeg;base64,AAAA");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "qwen-vl-plus-2025-01-25");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][1]["content"][0]["type"], "image_url");
        assert_eq!(
            json["messages"][1]["content"][0]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
        assert_eq!(json["messages"][1]["content"][1]["text"], USER_INSTRUCTION);
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        assert_eq!(client().endpoint(), "http://127.0.0.1:9/v1/chat/completions");
    }

    #[test]
    fn test_response_without_content_parses() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert!(response.choices[0].message.content.is_none());
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_missing_api_key_fails_construction() {
        let mut config = Config::for_tests("http://127.0.0.1:9/v1");
        config.vision.api_key = None;
        assert!(VisionClient::new(Arc::new(config), None, None).is_err());
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast() {
        let client = client();
        client.circuit_breaker().force_open();
        let err = client.analyze_image("data:image/jpeg;base64,AAAA").await.unwrap_err();
        assert!(matches!(err, ProxyError::CircuitOpen));
    }
}

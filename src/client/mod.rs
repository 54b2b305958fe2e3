// Client for the analysis proxy endpoint

use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::core::errors::{AnalysisError, ClientResult};
use crate::core::types::{AnalysisResult, AnalyzeRequest, ErrorBody};

/// Used when a failed response carries no `error` field
pub const GENERIC_FAILURE_MESSAGE: &str = "Analysis failed";

#[derive(Clone)]
pub struct AnalysisClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl AnalysisClient {
    pub fn new(endpoint: impl Into<String>) -> ClientResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one data-URL image for analysis. No retries; retry is the caller's call.
    #[instrument(skip(self, image_url), fields(endpoint = %self.endpoint, url_len = image_url.len()))]
    pub async fn analyze(&self, image_url: &str) -> ClientResult<AnalysisResult> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&AnalyzeRequest {
                image_url: image_url.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| GENERIC_FAILURE_MESSAGE.to_string());
            warn!("Analysis request failed with {}: {}", status, message);
            return Err(AnalysisError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let result = response
            .json::<AnalysisResult>()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;
        debug!("Received {} ingredients", result.ingredients.len());
        Ok(result)
    }
}

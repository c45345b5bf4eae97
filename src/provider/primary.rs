use super::{
    AnalysisProvider, AnalysisRequest, AnalysisResult, HealthHint, ProviderError, ProviderKind,
};
use crate::config::PrimaryConfig;
use crate::error::{Result, RouterError};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Upstream error bodies are truncated to this many characters
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Calls the remote analysis service over HTTP
pub struct HttpProvider {
    client: reqwest::Client,
    endpoint: String,
    model: Option<String>,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("client", &"<reqwest::Client>")
            .finish()
    }
}

#[derive(Serialize)]
struct UpstreamRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

#[derive(Deserialize)]
struct UpstreamResponse {
    emotion: String,
    #[serde(default)]
    sentiment: f32,
    #[serde(default)]
    intensity: f32,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    keywords: Vec<String>,
}

fn default_confidence() -> f32 {
    1.0
}

impl UpstreamResponse {
    fn into_result(self) -> std::result::Result<AnalysisResult, ProviderError> {
        let emotion = self.emotion.trim().to_lowercase();
        if emotion.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "missing emotion label".to_string(),
            ));
        }
        let scores = [self.sentiment, self.intensity, self.confidence];
        if scores.iter().any(|score| !score.is_finite()) {
            return Err(ProviderError::MalformedResponse(
                "non-finite score".to_string(),
            ));
        }

        Ok(AnalysisResult {
            emotion,
            sentiment: self.sentiment.clamp(-1.0, 1.0),
            intensity: self.intensity.clamp(0.0, 1.0),
            confidence: self.confidence.clamp(0.0, 1.0),
            keywords: self.keywords,
            provider: ProviderKind::Primary,
            degraded: false,
        })
    }
}

impl HttpProvider {
    /// Create a provider from configuration, resolving the API key from the environment
    pub fn new(config: &PrimaryConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key(),
            timeout,
        })
    }

    /// Replace the API key, e.g. with one from a secrets store
    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    fn classify_transport(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else if error.is_decode() {
            ProviderError::MalformedResponse(error.to_string())
        } else {
            ProviderError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl AnalysisProvider for HttpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Primary
    }

    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> std::result::Result<AnalysisResult, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::Unauthorized("no API key configured".to_string()))?;

        let body = UpstreamRequest {
            model: self.model.as_deref(),
            text: &request.text,
            context: request.context.as_deref(),
        };

        debug!(
            endpoint = %self.endpoint,
            chars = request.text.len(),
            "Calling primary provider"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let message: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();
            return Err(ProviderError::from_status(
                status.as_u16(),
                message,
                self.timeout,
            ));
        }

        let payload: UpstreamResponse = response
            .json()
            .await
            .map_err(|e| self.classify_transport(e))?;

        payload.into_result()
    }

    fn health_hint(&self) -> HealthHint {
        HealthHint {
            ok: self.api_key.is_some(),
            name: "http-primary".to_string(),
        }
    }
}

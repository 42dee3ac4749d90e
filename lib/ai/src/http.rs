//! HTTP client for the remote model invocation endpoint.
//!
//! The endpoint accepts an [`InvocationRequest`] as JSON and answers with an
//! [`InvocationResponse`]. Transport errors, non-success statuses and
//! `success: false` bodies all surface as [`LlmError`].

use crate::backend::{InvocationRequest, InvocationResponse, ModelBackend};
use crate::error::LlmError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Configuration for the model invocation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEndpointConfig {
    /// Full URL of the invocation endpoint.
    pub url: String,

    /// Request timeout in seconds. Model calls with images can be slow.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    60
}

/// [`ModelBackend`] that posts requests to a remote endpoint.
#[derive(Debug, Clone)]
pub struct HttpModelBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpModelBackend {
    /// Creates a backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidConfig`] if the URL is empty or the HTTP
    /// client cannot be built.
    pub fn new(config: &ModelEndpointConfig) -> Result<Self, LlmError> {
        if config.url.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "endpoint url is empty".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn transport_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::RequestFailed {
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    #[instrument(skip(self, request), fields(model = %request.model, images = request.images.len()))]
    async fn invoke(&self, request: &InvocationRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        let parsed = serde_json::from_str::<InvocationResponse>(&body);

        if !status.is_success() {
            let reason = parsed
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("endpoint returned {status}"));
            return Err(LlmError::RequestFailed { reason });
        }

        let output = parsed
            .map_err(|e| LlmError::ResponseParseFailed {
                reason: e.to_string(),
            })?
            .into_output()?;

        debug!(output_len = output.len(), "model invocation succeeded");
        Ok(output)
    }
}

//! Model backend abstraction.
//!
//! The engine depends only on [`ModelBackend`]; the HTTP client and test
//! doubles plug in behind it.

use crate::error::LlmError;
use crate::model::ModelId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A request to the model invocation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    /// The model to run.
    pub model: ModelId,
    /// System prompt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// The user message. Never blank once a request is built by the engine.
    pub user_message: String,
    /// Base64-encoded images, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl InvocationRequest {
    /// Creates a request with just a model and user message.
    #[must_use]
    pub fn new(model: ModelId, user_message: impl Into<String>) -> Self {
        Self {
            model,
            system_prompt: None,
            user_message: user_message.into(),
            images: Vec::new(),
        }
    }

    /// Adds a system prompt. Blank prompts are dropped.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        self.system_prompt = (!system_prompt.trim().is_empty()).then_some(system_prompt);
        self
    }

    /// Sets the base64-encoded images.
    #[must_use]
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

/// A response from the model invocation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Generated text on success.
    #[serde(default)]
    pub output: Option<String>,
    /// Failure message when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
}

impl InvocationResponse {
    /// Converts the response envelope into the generated text.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Rejected`] for `success: false` and
    /// [`LlmError::EmptyOutput`] when a successful response has no output.
    pub fn into_output(self) -> Result<String, LlmError> {
        if !self.success {
            return Err(LlmError::Rejected {
                reason: self
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "model invocation failed".to_string()),
            });
        }
        self.output.ok_or(LlmError::EmptyOutput)
    }
}

/// Trait for model invocation backends.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Runs the model and returns the generated text.
    async fn invoke(&self, request: &InvocationRequest) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_wire_shape() {
        let request = InvocationRequest::new(ModelId::Gemini25Flash, "hello")
            .with_system_prompt("sys")
            .with_images(vec!["aGk=".to_string()]);
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gemini-2.5-flash",
                "systemPrompt": "sys",
                "userMessage": "hello",
                "images": ["aGk="],
            })
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let request = InvocationRequest::new(ModelId::from("m"), "hello").with_system_prompt("  ");
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json, serde_json::json!({"model": "m", "userMessage": "hello"}));
    }

    #[test]
    fn success_response_yields_output() {
        let response: InvocationResponse =
            serde_json::from_str(r#"{"success":true,"output":"world"}"#).expect("deserialize");
        assert_eq!(response.into_output(), Ok("world".to_string()));
    }

    #[test]
    fn failed_response_is_rejection() {
        let response: InvocationResponse =
            serde_json::from_str(r#"{"success":false,"error":"bad model"}"#)
                .expect("deserialize");
        assert_eq!(
            response.into_output(),
            Err(LlmError::Rejected {
                reason: "bad model".to_string()
            })
        );
    }

    #[test]
    fn success_without_output_is_error() {
        let response = InvocationResponse {
            success: true,
            output: None,
            error: None,
        };
        assert_eq!(response.into_output(), Err(LlmError::EmptyOutput));
    }
}

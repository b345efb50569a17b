//! Text generation capability.
//!
//! [`TextGenerator`] is the only thing the service needs from a language
//! model: a name for metric labels and a prompt-in, text-out call.
//! [`HttpGenerator`] speaks a minimal JSON protocol to a model endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{CompanionError, Result};

/// Default request timeout for model calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A model that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier, used as the `model_name` label.
    fn model(&self) -> &str;

    /// Generate a reply for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Generator backed by an HTTP endpoint.
///
/// POSTs `{"model", "prompt", "system"?}` and expects `{"text"}` back.
#[derive(Clone)]
pub struct HttpGenerator {
    http: Client,
    endpoint: String,
    model: String,
    system_prompt: Option<String>,
}

impl HttpGenerator {
    /// Create a generator for `model` at `endpoint` with the default timeout.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, model, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompanionError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            model: model.into(),
            system_prompt: None,
        })
    }

    /// Send a system prompt with every request.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check response status and map to an error.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CompanionError::Api {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        })
    }
}

impl std::fmt::Debug for HttpGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(name = "http_generate", skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(prompt_len = prompt.len(), "sending generation request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                system: self.system_prompt.as_deref(),
            })
            .send()
            .await?;

        let response = Self::check_status(response).await?;

        let body: GenerateResponse = response.json().await?;

        if body.text.trim().is_empty() {
            return Err(CompanionError::EmptyResponse);
        }
        Ok(body.text)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    text: String,
}

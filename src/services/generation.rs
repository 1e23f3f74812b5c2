//! Generative backend for turning filled prompts into text.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::GenerationError;
use crate::models::GenerationConfig;
use crate::utils::retry::{RetryPolicy, retry};

/// Sampling options passed with each generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl From<&GenerationConfig> for GenerationOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

/// A shared, stateful text generator. Calls are fallible.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;

    /// Model identifier, for status output.
    fn model(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Retries applied to each generation call.
pub(crate) fn retry_policy(config: &GenerationConfig) -> RetryPolicy {
    RetryPolicy::new(config.max_retries.max(1))
}

/// Client for the Ollama `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaGenerationClient {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl OllamaGenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            retry: retry_policy(config),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn generate_once(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: SamplingOptions {
                temperature: options.temperature,
                num_predict: options.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    GenerationError::ConnectionError(e.to_string())
                } else {
                    GenerationError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        parse_generate_response(body)
    }
}

fn parse_generate_response(body: GenerateResponse) -> Result<String, GenerationError> {
    if let Some(error) = body.error {
        return Err(GenerationError::ServerError(error));
    }
    match body.response {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(GenerationError::InvalidResponse(
            "response contained no text".to_string(),
        )),
    }
}

#[async_trait]
impl GenerativeBackend for OllamaGenerationClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "generating");
        retry("generate", &self.retry, || self.generate_once(prompt, options)).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{error_from_response, http_client, map_transport_error, CompletionRequest, Provider, ProviderSettings};
use crate::errors::ProviderError;

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Model name
    model: String,
    /// Client-side timeout, for error reporting
    timeout: Duration,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    pub model: String,
    /// Prompt to generate from
    pub prompt: String,
    /// System message to guide the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
    /// Format to return a response in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation (default: 0.8)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Generated text
    #[serde(default)]
    pub response: String,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
    /// Number of prompt tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

impl GenerationRequest {
    /// Build a non-streaming generate request from a completion request
    pub fn from_completion(model: &str, request: &CompletionRequest) -> Self {
        Self {
            model: model.to_string(),
            prompt: request.prompt.clone(),
            system: (!request.system.is_empty()).then(|| request.system.clone()),
            options: Some(GenerationOptions {
                temperature: Some(request.temperature),
                num_predict: Some(request.max_tokens),
            }),
            format: request.json_output.then(|| "json".to_string()),
            stream: Some(false),
        }
    }
}

impl Ollama {
    /// Create a new Ollama client
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        let base_url = if settings.endpoint.is_empty() {
            "http://localhost:11434".to_string()
        } else if settings.endpoint.starts_with("http://") || settings.endpoint.starts_with("https://") {
            settings.endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", settings.endpoint.trim_end_matches('/'))
        };

        url::Url::parse(&base_url)
            .map_err(|e| ProviderError::ConnectionError(format!("Invalid Ollama endpoint '{}': {}", base_url, e)))?;

        Ok(Self {
            base_url,
            client: http_client(settings.timeout)?,
            model: settings.model,
            timeout: settings.timeout,
        })
    }

    /// Generate text from the Ollama API
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(error_from_response("Ollama", response).await);
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to get response text from Ollama API: {}", e)))?;

        Self::parse_generation(&response_text)
    }

    /// Parse a generate response.
    ///
    /// Some Ollama builds ignore `stream: false` and answer with JSON lines;
    /// those are concatenated into one response.
    pub fn parse_generation(response_text: &str) -> Result<GenerationResponse, ProviderError> {
        if let Ok(parsed) = serde_json::from_str::<GenerationResponse>(response_text) {
            return Ok(parsed);
        }

        let mut combined = GenerationResponse {
            model: String::new(),
            response: String::new(),
            done: false,
            prompt_eval_count: None,
            eval_count: None,
        };
        let mut parsed_any = false;

        for line in response_text.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<GenerationResponse>(line) {
                Ok(part) => {
                    parsed_any = true;
                    combined.response.push_str(&part.response);
                    if combined.model.is_empty() {
                        combined.model = part.model;
                    }
                    if part.done {
                        combined.done = true;
                        combined.prompt_eval_count = part.prompt_eval_count;
                        combined.eval_count = part.eval_count;
                    }
                }
                Err(e) => debug!("Skipping unparsable Ollama line: {}", e),
            }
        }

        if parsed_any {
            Ok(combined)
        } else {
            let preview: String = response_text.chars().take(500).collect();
            error!("Failed to parse Ollama API response. Raw response (first 500 chars): {}", preview);
            Err(ProviderError::ParseError("Unrecognized Ollama response".to_string()))
        }
    }
}

#[async_trait]
impl Provider for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let generation = GenerationRequest::from_completion(&self.model, request);
        let response = self.generate(&generation).await?;
        Ok(response.response)
    }
}

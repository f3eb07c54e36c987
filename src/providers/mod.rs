/*!
 * Provider implementations for different translation services.
 *
 * This module contains client implementations for various LLM providers:
 * - OpenAI: OpenAI chat completions API (and compatible servers)
 * - Anthropic: Anthropic messages API
 * - Ollama: Local LLM server
 * - Mock: scriptable in-process provider for tests and dry runs
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

/// A single text-in/text-out request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Instructions for the model
    pub system: String,
    /// Instructions plus payload
    pub prompt: String,
    /// Ask the provider for a JSON object if it supports it
    pub json_output: bool,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token cap
    pub max_tokens: u32,
    /// Target language code, for logging and mocks
    pub target_language: String,
}

/// Connection settings injected into a provider client
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
}

impl ProviderSettings {
    /// Settings for the active provider of a translation config
    pub fn from_config(config: &TranslationConfig) -> Self {
        Self {
            api_key: config.get_api_key(),
            endpoint: config.get_endpoint(),
            model: config.get_model(),
            timeout: config.get_timeout(),
        }
    }
}

/// Common trait for all LLM providers
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably by the translation service.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// Send a prompt and return the raw text of the reply
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError> {
        let request = CompletionRequest {
            system: String::new(),
            prompt: "Reply with OK.".to_string(),
            json_output: false,
            temperature: 0.0,
            max_tokens: 5,
            target_language: String::new(),
        };
        self.complete(&request).await.map(|_| ())
    }
}

/// Build the provider selected in the configuration
pub fn build_provider(config: &TranslationConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let settings = ProviderSettings::from_config(config);

    let provider: Arc<dyn Provider> = match config.provider {
        TranslationProvider::OpenAI => Arc::new(openai::OpenAI::new(settings)?),
        TranslationProvider::Anthropic => Arc::new(anthropic::Anthropic::new(settings)?),
        TranslationProvider::Ollama => Arc::new(ollama::Ollama::new(settings)?),
        TranslationProvider::Mock => Arc::new(mock::MockProvider::working()),
    };

    Ok(provider)
}

/// Shared reqwest client construction
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| ProviderError::ConnectionError(format!("Failed to build HTTP client: {}", e)))
}

/// Turn a transport failure into the matching provider error
pub(crate) fn map_transport_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout.as_secs())
    } else if error.is_connect() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

/// Read a non-success response into a provider error
pub(crate) async fn error_from_response(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to get error response text".to_string());
    log::error!("{} API error ({}): {}", provider, status, body);
    ProviderError::from_status(status.as_u16(), body)
}

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;

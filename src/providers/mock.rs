/*!
 * Mock provider implementation for testing and offline dry runs.
 *
 * This module provides a mock provider that simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds with tagged text
 * - `MockProvider::fail_first(n)` - Fails the first n calls, then succeeds
 * - `MockProvider::failing()` - Always fails with an error
 * - `MockProvider::fail_matching(s)` - Fails every call whose payload contains `s`
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CompletionRequest, Provider};
use crate::errors::ProviderError;
use crate::translation::prompts::{SOURCE_END, SOURCE_START};

/// Custom reply generator
pub type Responder = Arc<dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync>;

/// Per-request artificial latency
pub type DelayFn = Arc<dyn Fn(&CompletionRequest) -> Duration + Send + Sync>;

/// Behavior mode for the mock provider
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails the first `failures` calls, then succeeds
    FailFirst { failures: usize },
    /// Always fails with an error
    Failing,
    /// Fails calls whose payload contains the needle
    FailMatching { needle: String },
    /// Returns empty text
    Empty,
}

/// Mock provider for testing translation behavior
#[derive(Clone)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Calls received so far, shared between clones
    request_count: Arc<AtomicUsize>,
    /// Every request received, in call order
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    /// Custom response generator (optional)
    responder: Option<Responder>,
    /// Artificial latency (optional)
    delay: Option<DelayFn>,
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("behavior", &self.behavior)
            .field("request_count", &self.call_count())
            .finish()
    }
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            responder: None,
            delay: None,
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock that fails `failures` times before succeeding
    pub fn fail_first(failures: usize) -> Self {
        Self::new(MockBehavior::FailFirst { failures })
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock that fails every request mentioning `needle`
    pub fn fail_matching(needle: impl Into<String>) -> Self {
        Self::new(MockBehavior::FailMatching { needle: needle.into() })
    }

    /// Create a mock that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Set a custom response generator
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Delay every call by a fixed amount
    pub fn with_latency(self, latency: Duration) -> Self {
        self.with_delay_fn(move |_| latency)
    }

    /// Delay each call by an amount computed from the request
    pub fn with_delay_fn<F>(mut self, delay: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Arc::new(delay));
        self
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Copies of every request received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// The payload between the source markers of a prompt
    pub fn source_text(request: &CompletionRequest) -> &str {
        let prompt = request.prompt.as_str();
        let start = match prompt.find(SOURCE_START) {
            Some(pos) => pos + SOURCE_START.len(),
            None => return prompt,
        };
        let end = prompt[start..]
            .rfind(SOURCE_END)
            .map(|pos| start + pos)
            .unwrap_or(prompt.len());
        prompt[start..end].trim_matches('\n')
    }

    /// The JSON object payload of a structured request
    pub fn source_fields(request: &CompletionRequest) -> Option<Map<String, Value>> {
        serde_json::from_str::<Value>(Self::source_text(request))
            .ok()
            .and_then(|value| value.as_object().cloned())
    }

    /// Default reply: every string prefixed with the target language tag
    pub fn tagged_reply(request: &CompletionRequest) -> String {
        let tag = format!("[{}]", request.target_language);

        if request.json_output {
            if let Some(fields) = Self::source_fields(request) {
                let translated: Map<String, Value> = fields
                    .into_iter()
                    .map(|(key, value)| {
                        let text = value.as_str().unwrap_or_default();
                        (key, Value::String(format!("{} {}", tag, text)))
                    })
                    .collect();
                return Value::Object(translated).to_string();
            }
        }

        format!("{} {}", tag, Self::source_text(request))
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if let Some(delay) = &self.delay {
            let wait = delay(request);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }

        match &self.behavior {
            MockBehavior::Failing => {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "Simulated provider failure".to_string(),
                });
            }
            MockBehavior::FailFirst { failures } if count < *failures => {
                return Err(ProviderError::ApiError {
                    status_code: 503,
                    message: format!("Simulated failure (request #{})", count + 1),
                });
            }
            MockBehavior::FailMatching { needle } if Self::source_text(request).contains(needle.as_str()) => {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: format!("Simulated failure for payload containing '{}'", needle),
                });
            }
            MockBehavior::Empty => return Ok(String::new()),
            _ => {}
        }

        match &self.responder {
            Some(responder) => responder(request),
            None => Ok(Self::tagged_reply(request)),
        }
    }
}

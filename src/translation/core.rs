/*!
 * Core translation service.
 *
 * `TranslationService` wraps a provider with a bounded retry loop, a
 * per-call deadline and response sanitization. Every external call made by
 * the pipeline goes through `call_with_retry`.
 */

use anyhow::Context;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::app_config::{Config, RetryPolicy};
use crate::errors::{AppError, ParseError, ProviderError, TranslationError};
use crate::language_utils::LanguageCode;
use crate::providers::{build_provider, CompletionRequest, Provider};

use super::concurrency::ProviderProfile;
use super::fields::{parse_fields, FieldBundle, FieldName};
use super::formatting::{ContentKind, ResponseSanitizer};
use super::prompts::{PromptTemplate, TranslationPromptBuilder};

/// Runtime options for the translation service
#[derive(Debug, Clone)]
pub struct TranslationOptions {
    /// Language every post is written in
    pub source_language: LanguageCode,
    /// System prompt template with language placeholders
    pub system_prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token cap
    pub max_tokens: u32,
    /// Inputs shorter than this after trimming are returned as-is
    pub min_translatable_chars: usize,
    /// Pause between consecutive chunk calls
    pub pacing_delay: Duration,
    /// Chunks translated at once
    pub max_concurrent_chunks: usize,
    /// Deadline for a single external call
    pub call_timeout: Duration,
    /// Retry budget
    pub retry: RetryPolicy,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        let config = Config::default();
        Self {
            source_language: LanguageCode::default(),
            system_prompt: config.translation.common.system_prompt,
            temperature: config.translation.common.temperature,
            max_tokens: 4096,
            min_translatable_chars: config.translation.common.min_translatable_chars,
            pacing_delay: Duration::ZERO,
            max_concurrent_chunks: 1,
            call_timeout: Duration::from_secs(config.translation.common.call_timeout_secs),
            retry: config.translation.common.retry,
        }
    }
}

impl TranslationOptions {
    /// Options for the active provider of a configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let common = &config.translation.common;
        let profile = ProviderProfile::for_provider(config.translation.provider).with_overrides(common);
        let source_language = LanguageCode::parse(&config.source_language)
            .with_context(|| format!("Invalid source language '{}'", config.source_language))?;

        Ok(Self {
            source_language,
            system_prompt: common.system_prompt.clone(),
            temperature: common.temperature,
            max_tokens: config.translation.get_max_tokens(),
            min_translatable_chars: common.min_translatable_chars,
            pacing_delay: profile.pacing_delay,
            max_concurrent_chunks: profile.max_concurrent_chunks,
            call_timeout: Duration::from_secs(common.call_timeout_secs.max(1)),
            retry: common.retry.clone(),
        })
    }
}

/// Translation service for posts
#[derive(Debug, Clone)]
pub struct TranslationService {
    /// The provider that performs the calls
    provider: Arc<dyn Provider>,
    /// Runtime options
    pub options: TranslationOptions,
}

impl TranslationService {
    /// Create a service around an existing provider
    pub fn new(provider: Arc<dyn Provider>, options: TranslationOptions) -> Self {
        Self { provider, options }
    }

    /// Build the configured provider and wrap it
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let provider = build_provider(&config.translation)?;
        let options = TranslationOptions::from_config(config).map_err(|e| AppError::Config(format!("{:#}", e)))?;
        Ok(Self::new(provider, options))
    }

    /// The wrapped provider
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Whether a text is long enough to be sent out
    pub fn needs_translation(&self, text: &str) -> bool {
        text.trim().chars().count() >= self.options.min_translatable_chars
    }

    fn completion_request(&self, target: &LanguageCode, prompt: String, json_output: bool) -> CompletionRequest {
        let system = PromptTemplate::new(&self.options.system_prompt)
            .render(&self.options.source_language.name(), &target.name());
        CompletionRequest {
            system,
            prompt,
            json_output,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            target_language: target.to_string(),
        }
    }

    fn prompt_builder(&self, target: &LanguageCode) -> TranslationPromptBuilder {
        TranslationPromptBuilder::new(&self.options.source_language.name(), &target.name())
    }

    /// Translate a single text.
    ///
    /// Text below the translatable threshold is returned unchanged without a
    /// call. The result is sanitized according to `kind` and never empty.
    pub async fn translate_text(
        &self,
        text: &str,
        target: &LanguageCode,
        kind: ContentKind,
    ) -> Result<String, TranslationError> {
        if !self.needs_translation(text) {
            debug!("Skipping translation of {}-char text", text.trim().chars().count());
            return Ok(text.to_string());
        }

        let prompt = self.prompt_builder(target).text_prompt(text.trim(), kind);
        let request = self.completion_request(target, prompt, false);

        self.call_with_retry(&request, |raw| {
            let cleaned = ResponseSanitizer::clean(&raw, kind);
            if cleaned.is_empty() {
                Err(ProviderError::ParseError("Empty response".to_string()).into())
            } else {
                Ok(cleaned)
            }
        })
        .await
    }

    /// Translate a bundle of fields in one structured call.
    ///
    /// Fields the reply leaves out are translated one by one. A reply without
    /// the title counts as a failed attempt.
    pub async fn translate_fields(
        &self,
        bundle: &FieldBundle,
        target: &LanguageCode,
    ) -> Result<FieldBundle, TranslationError> {
        if bundle.is_empty() {
            return Ok(FieldBundle::default());
        }

        let expected: Vec<FieldName> = bundle.names().collect();
        let prompt = self.prompt_builder(target).fields_prompt(bundle);
        let request = self.completion_request(target, prompt, true);

        let parsed = self
            .call_with_retry(&request, |raw| {
                let parsed = parse_fields(&raw, &expected)?;
                if parsed.missing.contains(&FieldName::Title) {
                    return Err(ParseError::MissingFields(vec![FieldName::Title.key().to_string()]).into());
                }
                Ok(parsed)
            })
            .await?;
        if !parsed.is_complete() {
            debug!("Structured reply recovered {} of {} field(s)", parsed.fields.len(), expected.len());
        }

        let mut translated = FieldBundle::default();
        for (name, value) in parsed.fields.iter() {
            translated.set(name, ResponseSanitizer::clean(value, name.kind()));
        }

        for name in bundle.missing_from(&translated) {
            let Some(source) = bundle.get(name) else {
                continue;
            };
            warn!("Field '{}' missing from structured reply, translating it separately", name);
            let value = self.translate_text(source, target, name.kind()).await?;
            translated.set(name, value);
        }

        Ok(translated)
    }

    /// Send a request until `accept` takes the reply or the attempts run out.
    ///
    /// Timeouts, provider errors and rejected replies all count as failed
    /// attempts. Authentication errors stop the loop at once.
    pub(crate) async fn call_with_retry<T, F>(
        &self,
        request: &CompletionRequest,
        mut accept: F,
    ) -> Result<T, TranslationError>
    where
        F: FnMut(String) -> Result<T, TranslationError>,
    {
        let policy = &self.options.retry;
        let max_attempts = policy.attempts_per_call.max(1);
        let mut causes: Vec<String> = Vec::new();

        for attempt in 1..=max_attempts {
            let outcome = match timeout(self.options.call_timeout, self.provider.complete(request)).await {
                Err(_) => Err(TranslationError::Provider(ProviderError::Timeout(
                    self.options.call_timeout.as_secs(),
                ))),
                Ok(Err(e)) => Err(TranslationError::Provider(e)),
                Ok(Ok(raw)) => accept(raw),
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            "{} call for '{}' succeeded on attempt {}/{}",
                            self.provider.name(),
                            request.target_language,
                            attempt,
                            max_attempts
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if let TranslationError::Provider(provider_error) = &error {
                if !provider_error.is_retryable() {
                    return Err(error);
                }
            }

            warn!(
                "{} call for '{}' failed (attempt {}/{}): {}",
                self.provider.name(),
                request.target_language,
                attempt,
                max_attempts,
                error
            );
            causes.push(error.to_string());

            if attempt < max_attempts {
                tokio::time::sleep(policy.delay_after(attempt)).await;
            }
        }

        Err(TranslationError::RetriesExhausted {
            attempts: max_attempts,
            last_cause: causes.last().cloned().unwrap_or_default(),
            causes,
        })
    }
}

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration module
/// This module handles the pipeline configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Language the posts are written in (ISO)
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Chunking thresholds
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Job orchestration settings
    #[serde(default)]
    pub jobs: JobConfig,

    /// Location of the job-record database, platform data dir when unset
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: OpenAI (or any OpenAI-compatible endpoint)
    #[default]
    OpenAI,
    // @provider: Anthropic
    Anthropic,
    // @provider: Ollama
    Ollama,
    // @provider: Offline mock, echoes tagged input
    Mock,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Ollama => "Ollama",
            Self::Mock => "Mock",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::Ollama => "ollama".to_string(),
            Self::Mock => "mock".to_string(),
        }
    }

    // @returns: Whether the provider needs an API key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI | Self::Anthropic)
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: HTTP timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Completion token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        let (model, endpoint) = match provider_type {
            TranslationProvider::OpenAI => (default_openai_model(), default_openai_endpoint()),
            TranslationProvider::Anthropic => (default_anthropic_model(), default_anthropic_endpoint()),
            TranslationProvider::Ollama => (default_ollama_model(), default_ollama_endpoint()),
            TranslationProvider::Mock => ("mock".to_string(), String::new()),
        };

        Self {
            provider_type: provider_type.to_lowercase_string(),
            model,
            api_key: String::new(),
            endpoint,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// System prompt template for translation
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Inputs shorter than this (after trimming) are returned untranslated
    #[serde(default = "default_min_translatable_chars")]
    pub min_translatable_chars: usize,

    /// Delay between consecutive chunk calls; provider profile default when unset
    #[serde(default)]
    pub pacing_delay_ms: Option<u64>,

    /// Chunks translated at once; provider profile default when unset
    #[serde(default)]
    pub max_concurrent_chunks: Option<usize>,

    /// Deadline for a single external call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// The whole retry budget
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            min_translatable_chars: default_min_translatable_chars(),
            pacing_delay_ms: None,
            max_concurrent_chunks: None,
            call_timeout_secs: default_call_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Retry budget for a translation job.
///
/// A single field or chunk may be sent to the provider up to
/// `attempts_per_call * job_runs` times before the job is reported failed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per external call, including the first one
    #[serde(default = "default_attempts_per_call")]
    pub attempts_per_call: u32,

    /// Full job executions, including the first one
    #[serde(default = "default_job_runs")]
    pub job_runs: u32,

    /// Delay before the second attempt, doubled for each later one
    #[serde(default = "default_retry_backoff_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_retry_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.backoff_base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }

    /// Worst-case number of external calls for one unit of work
    pub fn max_calls_per_unit(&self) -> u32 {
        self.attempts_per_call.saturating_mul(self.job_runs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_per_call: default_attempts_per_call(),
            job_runs: default_job_runs(),
            backoff_base_ms: default_retry_backoff_ms(),
            backoff_max_ms: default_retry_backoff_max_ms(),
        }
    }
}

/// Size thresholds for splitting post bodies
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChunkingConfig {
    /// Paragraph fragments shorter than this are merged into a neighbour
    #[serde(default = "default_min_fragment_chars")]
    pub min_fragment_chars: usize,

    /// Chunks longer than this are split on sentence boundaries
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Bodies up to this size travel inside the field bundle request
    #[serde(default = "default_inline_body_max_chars")]
    pub inline_body_max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_fragment_chars: default_min_fragment_chars(),
            max_chunk_chars: default_max_chunk_chars(),
            inline_body_max_chars: default_inline_body_max_chars(),
        }
    }
}

/// Job orchestration settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JobConfig {
    /// Jobs executed at the same time, in either mode
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Background jobs waiting for a worker slot
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Highest numeric suffix tried when a slug is taken
    #[serde(default = "default_slug_suffix_limit")]
    pub slug_suffix_limit: u32,

    /// Seconds a claimed run stays owned without a heartbeat; other
    /// processes only recover runs whose lease ran out
    #[serde(default = "default_run_lease_secs")]
    pub run_lease_secs: u64,
}

impl JobConfig {
    pub fn run_lease(&self) -> Duration {
        Duration::from_secs(self.run_lease_secs)
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            queue_capacity: default_queue_capacity(),
            slug_suffix_limit: default_slug_suffix_limit(),
            run_lease_secs: default_run_lease_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_min_translatable_chars() -> usize {
    3
}

fn default_attempts_per_call() -> u32 {
    3
}

fn default_job_runs() -> u32 {
    2 // first run plus one automatic re-run
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_retry_backoff_max_ms() -> u64 {
    30_000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_min_fragment_chars() -> usize {
    20
}

fn default_max_chunk_chars() -> usize {
    4000
}

fn default_inline_body_max_chars() -> usize {
    1500
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

fn default_slug_suffix_limit() -> u32 {
    10_000
}

fn default_run_lease_secs() -> u64 {
    120
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1".to_string()
}

fn default_system_prompt() -> String {
    "You are a professional translator for a travel blog. Translate the content from {source_language} to {target_language}. Keep every HTML tag, attribute and link exactly as it is and translate only the human-readable text. Keep proper names of places unless they have an established {target_language} name.".to_string()
}

impl Config {
    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        crate::language_utils::get_language_name(&self.source_language)?;

        if self.translation.provider.requires_api_key() && self.translation.get_api_key().is_empty() {
            return Err(anyhow!(
                "Translation API key is required for {} provider",
                self.translation.provider.display_name()
            ));
        }

        let retry = &self.translation.common.retry;
        if retry.attempts_per_call == 0 {
            return Err(anyhow!("retry.attempts_per_call must be at least 1"));
        }
        if retry.job_runs == 0 {
            return Err(anyhow!("retry.job_runs must be at least 1"));
        }

        if self.chunking.max_chunk_chars == 0 {
            return Err(anyhow!("chunking.max_chunk_chars must be greater than 0"));
        }
        if self.chunking.min_fragment_chars >= self.chunking.max_chunk_chars {
            return Err(anyhow!(
                "chunking.min_fragment_chars ({}) must be smaller than max_chunk_chars ({})",
                self.chunking.min_fragment_chars,
                self.chunking.max_chunk_chars
            ));
        }

        if self.jobs.max_concurrent_jobs == 0 || self.jobs.queue_capacity == 0 {
            return Err(anyhow!("jobs.max_concurrent_jobs and jobs.queue_capacity must be positive"));
        }
        if self.jobs.run_lease_secs == 0 {
            return Err(anyhow!("jobs.run_lease_secs must be positive"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            translation: TranslationConfig::default(),
            chunking: ChunkingConfig::default(),
            jobs: JobConfig::default(),
            database_path: None,
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a mutable active provider configuration, inserting defaults if absent
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        let position = self.available_providers.iter().position(|p| p.provider_type == provider_str);
        match position {
            Some(index) => &mut self.available_providers[index],
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider));
                let last = self.available_providers.len() - 1;
                &mut self.available_providers[last]
            }
        }
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter().find(|p| p.provider_type == provider_str)
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        self.get_active_provider_config()
            .filter(|p| !p.model.is_empty())
            .map(|p| p.model.clone())
            .unwrap_or_else(|| ProviderConfig::new(self.provider).model)
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        self.get_active_provider_config()
            .filter(|p| !p.endpoint.is_empty())
            .map(|p| p.endpoint.clone())
            .unwrap_or_else(|| ProviderConfig::new(self.provider).endpoint)
    }

    /// Get the HTTP timeout for the active provider
    pub fn get_timeout(&self) -> Duration {
        let secs = self
            .get_active_provider_config()
            .map(|p| p.timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or_else(default_timeout_secs);
        Duration::from_secs(secs)
    }

    /// Get the completion token cap for the active provider
    pub fn get_max_tokens(&self) -> u32 {
        self.get_active_provider_config()
            .map(|p| p.max_tokens)
            .filter(|tokens| *tokens > 0)
            .unwrap_or_else(default_max_tokens)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::OpenAI),
                ProviderConfig::new(TranslationProvider::Anthropic),
                ProviderConfig::new(TranslationProvider::Ollama),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}

/*!
 * Provider-specific pacing and concurrency defaults.
 *
 * Hosted APIs get a pause between consecutive chunk calls to stay below
 * their rate limits; local and in-process providers do not.
 */

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::app_config::{TranslationCommonConfig, TranslationProvider};

/// Provider-specific defaults for chunk translation
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    /// Pause between consecutive calls
    pub pacing_delay: Duration,
    /// Chunks translated at once; 1 means sequential
    pub max_concurrent_chunks: usize,
}

impl ProviderProfile {
    /// Get the default profile for a given provider
    pub fn for_provider(provider: TranslationProvider) -> Self {
        match provider {
            TranslationProvider::OpenAI => Self {
                pacing_delay: Duration::from_millis(500),
                max_concurrent_chunks: 1,
            },
            TranslationProvider::Anthropic => Self {
                // Lower default rate limits
                pacing_delay: Duration::from_millis(1000),
                max_concurrent_chunks: 1,
            },
            TranslationProvider::Ollama => Self {
                pacing_delay: Duration::ZERO,
                max_concurrent_chunks: 1,
            },
            TranslationProvider::Mock => Self {
                pacing_delay: Duration::ZERO,
                max_concurrent_chunks: 4,
            },
        }
    }

    /// Apply user overrides from the common translation settings
    pub fn with_overrides(mut self, common: &TranslationCommonConfig) -> Self {
        if let Some(ms) = common.pacing_delay_ms {
            self.pacing_delay = Duration::from_millis(ms);
        }
        if let Some(n) = common.max_concurrent_chunks {
            self.max_concurrent_chunks = n.max(1);
        }
        self
    }
}

/// Spaces out call starts shared by concurrent tasks.
///
/// Each `wait` returns no sooner than `interval` after the previous one did.
#[derive(Debug)]
pub struct PacingGate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl PacingGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for the next free slot
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }

        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let start = match *next_slot {
            Some(slot) if slot > now => {
                tokio::time::sleep_until(slot).await;
                slot
            }
            _ => now,
        };
        *next_slot = Some(start + self.interval);
    }
}

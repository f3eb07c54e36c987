/*!
 * Chunk-by-chunk body translation.
 *
 * Chunks run sequentially with a pause between calls, or with bounded
 * concurrency when the provider profile allows it. Either way the result is
 * reassembled in chunk order, and the first failing chunk aborts the rest.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error};
use std::sync::Arc;

use crate::errors::TranslationError;
use crate::language_utils::LanguageCode;

use super::chunker::{join_chunks, Chunk};
use super::concurrency::PacingGate;
use super::core::TranslationService;
use super::formatting::ContentKind;

/// What was translated before a chunk failed
#[derive(Debug, Clone)]
pub struct PartialTranslation {
    /// Translated text per chunk position, `None` where none exists
    pub chunks: Vec<Option<String>>,
    /// `TranslationError::ChunkFailed` describing the failure
    pub error: TranslationError,
}

impl PartialTranslation {
    /// Number of chunks translated successfully
    pub fn completed(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    /// The translated chunks before the first gap, joined
    pub fn translated_prefix(&self) -> String {
        let prefix: Vec<&str> = self.chunks.iter().map_while(|c| c.as_deref()).collect();
        join_chunks(&prefix)
    }
}

/// Translator for the chunks of one body
pub struct ChunkTranslator {
    /// The translation service to use
    service: TranslationService,
}

impl ChunkTranslator {
    /// Create a new chunk translator
    pub fn new(service: TranslationService) -> Self {
        Self { service }
    }

    /// Translate every chunk, in order
    pub async fn translate_chunks(
        &self,
        chunks: &[Chunk],
        target: &LanguageCode,
    ) -> Result<Vec<String>, PartialTranslation> {
        if self.service.options.max_concurrent_chunks > 1 && chunks.len() > 1 {
            self.translate_concurrent(chunks, target).await
        } else {
            self.translate_sequential(chunks, target).await
        }
    }

    async fn translate_sequential(
        &self,
        chunks: &[Chunk],
        target: &LanguageCode,
    ) -> Result<Vec<String>, PartialTranslation> {
        let total = chunks.len();
        let pacing = self.service.options.pacing_delay;
        let mut translated: Vec<String> = Vec::with_capacity(total);
        let mut called_before = false;

        for (position, chunk) in chunks.iter().enumerate() {
            let needs_call = self.service.needs_translation(&chunk.content);
            // Pause only between calls, never after the last one
            if needs_call && called_before && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }

            match translate_chunk(&self.service, chunk, target).await {
                Ok(text) => translated.push(text),
                Err(e) => {
                    let mut slots: Vec<Option<String>> = translated.into_iter().map(Some).collect();
                    slots.resize(total, None);
                    return Err(chunk_failure(slots, position, e));
                }
            }
            called_before |= needs_call;
        }

        Ok(translated)
    }

    async fn translate_concurrent(
        &self,
        chunks: &[Chunk],
        target: &LanguageCode,
    ) -> Result<Vec<String>, PartialTranslation> {
        let total = chunks.len();
        let max_concurrent = self.service.options.max_concurrent_chunks;
        let gate = Arc::new(PacingGate::new(self.service.options.pacing_delay));

        let service = self.service.clone();
        let target = target.clone();

        // Owned inputs keep the stream `Send + 'static` for spawned job tasks
        let mut results = stream::iter(chunks.to_vec().into_iter().enumerate())
            .map(move |(position, chunk)| {
                let gate = gate.clone();
                let service = service.clone();
                let target = target.clone();
                async move {
                    if service.needs_translation(&chunk.content) {
                        gate.wait().await;
                    }
                    (position, translate_chunk(&service, &chunk, &target).await)
                }
            })
            .buffer_unordered(max_concurrent)
            .boxed();

        let mut slots: Vec<Option<String>> = vec![None; total];
        let mut failure = None;

        while let Some((position, result)) = results.next().await {
            match result {
                Ok(text) => slots[position] = Some(text),
                Err(e) => {
                    failure = Some((position, e));
                    break;
                }
            }
        }
        // Dropping the stream cancels chunks still in flight
        drop(results);

        match failure {
            Some((position, e)) => Err(chunk_failure(slots, position, e)),
            None => Ok(slots.into_iter().flatten().collect()),
        }
    }
}

impl TranslationService {
    /// Translate body chunks with this service's pacing and concurrency
    pub async fn translate_chunks(
        &self,
        chunks: &[Chunk],
        target: &LanguageCode,
    ) -> Result<Vec<String>, PartialTranslation> {
        ChunkTranslator::new(self.clone()).translate_chunks(chunks, target).await
    }
}

/// Translate one chunk, keeping the whitespace around it
async fn translate_chunk(
    service: &TranslationService,
    chunk: &Chunk,
    target: &LanguageCode,
) -> Result<String, TranslationError> {
    let content = chunk.content.as_str();
    if !service.needs_translation(content) {
        return Ok(content.to_string());
    }

    let inner = content.trim();
    let leading = &content[..content.len() - content.trim_start().len()];
    let trailing = &content[content.trim_end().len()..];

    debug!("Translating chunk {} ({} chars)", chunk.index, inner.chars().count());
    let translated = service.translate_text(inner, target, ContentKind::Html).await?;
    Ok(format!("{}{}{}", leading, translated, trailing))
}

fn chunk_failure(slots: Vec<Option<String>>, position: usize, source: TranslationError) -> PartialTranslation {
    let total = slots.len();
    let completed = slots.iter().filter(|c| c.is_some()).count();
    error!("Chunk {} of {} failed after {} completed: {}", position + 1, total, completed, source);
    PartialTranslation {
        chunks: slots,
        error: TranslationError::ChunkFailed {
            index: position,
            total,
            completed,
            source: Box::new(source),
        },
    }
}

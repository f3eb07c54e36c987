/*!
 * Splitting of post bodies into translation-sized chunks.
 *
 * Chunks are contiguous slices of the input, so concatenating them in index
 * order reproduces the body exactly. Splits always fall immediately before a
 * block-level opening tag or after a sentence end, never inside a tag.
 *
 * Strategy, first match wins:
 * 1. Split before every second or third level heading
 * 2. Split before every paragraph, merging fragments too small to stand alone
 * 3. Split after blank lines
 *
 * Any chunk still above the size limit is split again at sentence ends.
 */

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::app_config::ChunkingConfig;
use crate::errors::ChunkError;

static HEADING_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h[23][\s>]").unwrap());

static PARAGRAPH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<p[\s>]").unwrap());

static BLANK_LINE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").unwrap());

/// One contiguous slice of a post body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the body, starting at 0
    pub index: usize,
    /// The exact source slice
    pub content: String,
}

impl Chunk {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Splits HTML bodies according to a `ChunkingConfig`
#[derive(Debug, Clone)]
pub struct ContentChunker {
    config: ChunkingConfig,
}

impl Default for ContentChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

impl ContentChunker {
    /// Create a chunker with the given thresholds
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split a body into ordered chunks.
    ///
    /// Empty or whitespace-only input yields no chunks.
    pub fn chunk(&self, html: &str) -> Vec<Chunk> {
        if html.trim().is_empty() {
            return Vec::new();
        }

        let spans = if HEADING_REGEX.is_match(html) {
            split_before_matches(html, &HEADING_REGEX)
        } else if PARAGRAPH_REGEX.is_match(html) {
            let spans = split_before_matches(html, &PARAGRAPH_REGEX);
            merge_small_fragments(html, spans, self.config.min_fragment_chars)
        } else {
            split_after_blank_lines(html)
        };

        let mut sized: Vec<&str> = Vec::with_capacity(spans.len());
        for span in merge_small_fragments(html, spans, 1) {
            let segment = &html[span];
            let length = segment.chars().count();
            if length <= self.config.max_chunk_chars {
                sized.push(segment);
                continue;
            }

            match split_sentences(segment, self.config.max_chunk_chars) {
                Ok(parts) => {
                    debug!("Split oversized block of {} chars into {} parts", length, parts.len());
                    sized.extend(parts);
                }
                Err(e) => {
                    warn!("Keeping oversized chunk: {}", e);
                    sized.push(segment);
                }
            }
        }

        sized
            .into_iter()
            .enumerate()
            .map(|(index, content)| Chunk {
                index,
                content: content.to_string(),
            })
            .collect()
    }
}

/// Concatenate translated chunks back into a body
pub fn join_chunks<S: AsRef<str>>(parts: &[S]) -> String {
    parts.iter().map(|part| part.as_ref()).collect()
}

/// Byte ranges of `text`, each starting at a match of `pattern`
fn split_before_matches(text: &str, pattern: &Regex) -> Vec<Range<usize>> {
    let mut boundaries: Vec<usize> = pattern.find_iter(text).map(|m| m.start()).filter(|&start| start > 0).collect();
    boundaries.push(text.len());

    let mut spans = Vec::with_capacity(boundaries.len());
    let mut start = 0;
    for end in boundaries {
        if end > start {
            spans.push(start..end);
            start = end;
        }
    }
    spans
}

/// Byte ranges of `text`, each ending after a blank-line separator
fn split_after_blank_lines(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    for separator in BLANK_LINE_REGEX.find_iter(text) {
        if separator.end() > start && separator.end() < text.len() {
            spans.push(start..separator.end());
            start = separator.end();
        }
    }
    if start < text.len() {
        spans.push(start..text.len());
    }
    spans
}

/// Fold ranges whose trimmed text is shorter than `min_chars` into a neighbor.
///
/// A small range joins the previous one; small leading ranges join the next.
/// Input ranges must be contiguous, and so is the output.
fn merge_small_fragments(text: &str, spans: Vec<Range<usize>>, min_chars: usize) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    let mut carry: Option<usize> = None;

    for span in spans {
        let small = text[span.clone()].trim().chars().count() < min_chars;
        if small {
            match merged.last_mut() {
                Some(last) => last.end = span.end,
                None => {
                    carry.get_or_insert(span.start);
                }
            }
        } else {
            let start = carry.take().unwrap_or(span.start);
            merged.push(start..span.end);
        }
    }

    if let Some(start) = carry {
        merged.push(start..text.len());
    }
    merged
}

/// Byte offsets where a new sentence starts, outside of tags
fn sentence_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_tag = false;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            '.' if !in_tag => {
                let mut saw_space = false;
                while let Some(&(next_pos, next)) = chars.peek() {
                    if next == ' ' || next == '\t' || next == '\n' {
                        saw_space = true;
                        chars.next();
                        continue;
                    }
                    if saw_space && (next.is_uppercase() || next == '<') {
                        starts.push(next_pos);
                    }
                    break;
                }
            }
            _ => {}
        }
    }
    starts
}

/// Regroup a block into sentence groups of at most `max_chars`.
///
/// A single sentence longer than the limit still becomes its own group.
fn split_sentences(text: &str, max_chars: usize) -> Result<Vec<&str>, ChunkError> {
    let starts = sentence_starts(text);
    if starts.is_empty() {
        return Err(ChunkError::BoundaryNotFound {
            length: text.chars().count(),
            limit: max_chars,
        });
    }

    let mut bounds = starts;
    bounds.push(text.len());

    let mut groups = Vec::new();
    let mut group_start = 0;
    let mut group_chars = 0;
    let mut sentence_start = 0;

    for end in bounds {
        let sentence_chars = text[sentence_start..end].chars().count();
        if group_chars > 0 && group_chars + sentence_chars > max_chars {
            groups.push(&text[group_start..sentence_start]);
            group_start = sentence_start;
            group_chars = 0;
        }
        group_chars += sentence_chars;
        sentence_start = end;
    }
    groups.push(&text[group_start..]);

    Ok(groups)
}

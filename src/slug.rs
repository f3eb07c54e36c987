/*!
 * Translated slug derivation.
 *
 * A translated slug is the slugified translated title, prefixed with the
 * locale-invariant directory part of the source slug (`france/` in
 * `france/paris-in-three-days`). Uniqueness per language is resolved by
 * the store, which appends `-1`, `-2`, ... while the candidate is taken.
 */

use anyhow::Result;
use log::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::errors::TranslationError;

/// Letters that NFD does not decompose into a base letter plus a mark
fn fold_special(c: char) -> Option<&'static str> {
    match c {
        'ß' => Some("ss"),
        'æ' | 'Æ' => Some("ae"),
        'œ' | 'Œ' => Some("oe"),
        'ø' | 'Ø' => Some("o"),
        'ł' | 'Ł' => Some("l"),
        'đ' | 'Đ' => Some("d"),
        'þ' | 'Þ' => Some("th"),
        'ı' => Some("i"),
        _ => None,
    }
}

fn push_piece(piece: &str, slug: &mut String, pending_separator: &mut bool) {
    if *pending_separator && !slug.is_empty() {
        slug.push('-');
    }
    *pending_separator = false;
    slug.push_str(piece);
}

/// Lowercase, strip diacritics and join words with single hyphens
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if let Some(folded) = fold_special(c) {
            push_piece(folded, &mut slug, &mut pending_separator);
        } else if c.is_alphanumeric() {
            let lower: String = c.to_lowercase().collect();
            push_piece(&lower, &mut slug, &mut pending_separator);
        } else if c == '\'' || c == '’' {
            // "l'été" reads better as "lete" than "l-ete"
            continue;
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Directory part of a source slug that stays the same in every locale
pub fn locale_invariant_prefix(source_slug: &str) -> Option<&str> {
    let trimmed = source_slug.trim_matches('/');
    trimmed.rfind('/').map(|pos| &trimmed[..=pos])
}

/// Build the (not yet deduplicated) slug for a translated title
pub fn translated_slug(translated_title: &str, source_slug: &str) -> String {
    let mut leaf = slugify(translated_title);
    if leaf.is_empty() {
        // Titles made only of punctuation fall back to the source leaf
        let trimmed = source_slug.trim_matches('/');
        leaf = trimmed.rsplit('/').next().unwrap_or(trimmed).to_string();
    }

    match locale_invariant_prefix(source_slug) {
        Some(prefix) => format!("{}{}", prefix, leaf),
        None => leaf,
    }
}

/// Candidate number `n` for a base slug (`n == 0` is the base itself)
pub fn with_suffix(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}

/// First candidate for which `is_taken` answers false
pub fn resolve_unique<F>(base: &str, limit: u32, mut is_taken: F) -> Result<String>
where
    F: FnMut(&str) -> Result<bool>,
{
    for n in 0..=limit {
        let candidate = with_suffix(base, n);
        if !is_taken(&candidate)? {
            if n > 0 {
                debug!("Slug '{}' taken, using '{}'", base, candidate);
            }
            return Ok(candidate);
        }
    }

    Err(TranslationError::SlugCollisionExhausted {
        base: base.to_string(),
        limit,
    }
    .into())
}

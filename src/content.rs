/*!
 * Read-only access to the posts being translated.
 *
 * The pipeline never writes posts back; it only derives translated copies
 * of the fields exposed here.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// A post as seen by the translation pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    /// HTML body
    #[serde(default)]
    pub content: String,
    pub slug: String,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
}

impl SourceDocument {
    /// Hex sha256 over every translatable field.
    ///
    /// Stored with a completed translation so later reads can tell whether
    /// the post changed since.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let fields = [
            Some(self.title.as_str()),
            self.excerpt.as_deref(),
            Some(self.content.as_str()),
            Some(self.slug.as_str()),
            self.seo_title.as_deref(),
            self.seo_description.as_deref(),
            self.meta_title.as_deref(),
            self.meta_description.as_deref(),
        ];
        for field in fields {
            hasher.update(field.unwrap_or_default().as_bytes());
            // Separator keeps ("ab", "c") and ("a", "bc") apart
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Read access to posts
#[async_trait]
pub trait ContentSource: Send + Sync + Debug {
    /// Fetch a post by ID, `None` if it does not exist
    async fn get_post(&self, post_id: &str) -> Result<Option<SourceDocument>>;
}

/// Posts held in memory, keyed by ID
#[derive(Debug, Clone, Default)]
pub struct InMemoryContentSource {
    posts: Arc<RwLock<HashMap<String, SourceDocument>>>,
}

impl InMemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from a list of posts
    pub fn from_posts(posts: impl IntoIterator<Item = SourceDocument>) -> Self {
        let source = Self::new();
        for post in posts {
            source.insert(post);
        }
        source
    }

    /// Add or replace a post
    pub fn insert(&self, post: SourceDocument) {
        self.posts.write().insert(post.id.clone(), post);
    }

    pub fn len(&self) -> usize {
        self.posts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.read().is_empty()
    }
}

#[async_trait]
impl ContentSource for InMemoryContentSource {
    async fn get_post(&self, post_id: &str) -> Result<Option<SourceDocument>> {
        Ok(self.posts.read().get(post_id).cloned())
    }
}

/// Posts loaded from a JSON array on disk (used by the CLI)
#[derive(Debug, Clone)]
pub struct JsonContentSource {
    inner: InMemoryContentSource,
}

impl JsonContentSource {
    /// Read `[{id, title, content, slug, ...}, ...]` from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read posts file: {}", path.display()))?;
        let posts: Vec<SourceDocument> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse posts file: {}", path.display()))?;
        debug!("Loaded {} posts from {}", posts.len(), path.display());
        Ok(Self {
            inner: InMemoryContentSource::from_posts(posts),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl ContentSource for JsonContentSource {
    async fn get_post(&self, post_id: &str) -> Result<Option<SourceDocument>> {
        self.inner.get_post(post_id).await
    }
}

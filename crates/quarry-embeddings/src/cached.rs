use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::QuarryError;

use crate::{CachePut, EmbeddingCache, Embeddings};

/// An embeddings wrapper that consults an [`EmbeddingCache`] before the model.
///
/// Cached texts are served directly; only misses are sent to the inner
/// provider, and identical misses within one batch are embedded once.
pub struct CacheBackedEmbeddings {
    inner: Arc<dyn Embeddings>,
    cache: Arc<EmbeddingCache>,
}

impl CacheBackedEmbeddings {
    /// Create a cached wrapper with its own private cache.
    pub fn new(inner: Arc<dyn Embeddings>) -> Self {
        Self::with_cache(inner, Arc::new(EmbeddingCache::new()))
    }

    /// Create a cached wrapper over a shared cache.
    pub fn with_cache(inner: Arc<dyn Embeddings>, cache: Arc<EmbeddingCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Store a freshly computed vector and return the value the cache now holds.
    fn store(&self, text: &str, embedding: Vec<f32>) -> Vec<f32> {
        let model_id = self.inner.model_id();
        match self.cache.put(text, model_id, embedding.clone()) {
            CachePut::Conflict => self.cache.get(text, model_id).unwrap_or(embedding),
            CachePut::Inserted | CachePut::AlreadyPresent => embedding,
        }
    }
}

#[async_trait]
impl Embeddings for CacheBackedEmbeddings {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, QuarryError> {
        let model_id = self.inner.model_id();
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        // cache key -> positions in `texts` waiting on that key
        let mut pending: HashMap<String, Vec<usize>> = HashMap::new();
        let mut uncached_texts: Vec<&str> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if let Some(cached) = self.cache.get(text, model_id) {
                results.push(Some(cached));
                continue;
            }
            results.push(None);
            let key = EmbeddingCache::key(text, model_id);
            let waiting = pending.entry(key).or_default();
            if waiting.is_empty() {
                uncached_texts.push(text);
            }
            waiting.push(i);
        }

        if !uncached_texts.is_empty() {
            tracing::debug!(
                model_id,
                hits = texts.len() - pending.values().map(Vec::len).sum::<usize>(),
                misses = uncached_texts.len(),
                "embedding cache lookup"
            );
            let new_embeddings = self.inner.embed_documents(&uncached_texts).await?;
            if new_embeddings.len() != uncached_texts.len() {
                return Err(QuarryError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    uncached_texts.len(),
                    new_embeddings.len()
                )));
            }

            for (text, embedding) in uncached_texts.iter().zip(new_embeddings) {
                let stored = self.store(text, embedding);
                let key = EmbeddingCache::key(text, model_id);
                for idx in pending.get(&key).into_iter().flatten() {
                    results[*idx] = Some(stored.clone());
                }
            }
        }

        results
            .into_iter()
            .map(|r| {
                r.ok_or_else(|| QuarryError::Embedding("missing embedding for input".to_string()))
            })
            .collect()
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, QuarryError> {
        if let Some(cached) = self.cache.get(text, self.inner.model_id()) {
            return Ok(cached);
        }

        let embedding = self.inner.embed_query(text).await?;
        Ok(self.store(text, embedding))
    }
}

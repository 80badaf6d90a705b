use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Result of writing an embedding into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePut {
    /// The key was absent and the embedding was stored.
    Inserted,
    /// The key already held an identical embedding; nothing changed.
    AlreadyPresent,
    /// The key already held a different embedding. The first write is kept.
    Conflict,
}

/// Write-once, read-many store of embedding vectors.
///
/// Entries are keyed by `sha256(model_id, normalized text)`. Reads go through
/// a sharded concurrent map; a write only ever fills an empty slot, so two
/// concurrent misses on the same key store at most one value.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: DashMap<String, Arc<[f32]>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a (text, model) pair.
    pub fn key(text: &str, model_id: &str) -> String {
        let normalized = normalize_text(text);
        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, text: &str, model_id: &str) -> Option<Vec<f32>> {
        self.entries
            .get(&Self::key(text, model_id))
            .map(|entry| entry.value().to_vec())
    }

    pub fn contains(&self, text: &str, model_id: &str) -> bool {
        self.entries.contains_key(&Self::key(text, model_id))
    }

    /// Store an embedding unless the key is already filled.
    pub fn put(&self, text: &str, model_id: &str, embedding: Vec<f32>) -> CachePut {
        let key = Self::key(text, model_id);
        match self.entries.entry(key) {
            Entry::Occupied(existing) => {
                if existing.get().as_ref() == embedding.as_slice() {
                    CachePut::AlreadyPresent
                } else {
                    tracing::warn!(
                        key = %existing.key(),
                        model_id,
                        "embedding cache conflict, keeping first write"
                    );
                    CachePut::Conflict
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::from(embedding));
                CachePut::Inserted
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collapse runs of whitespace and trim, so formatting noise maps to one key.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

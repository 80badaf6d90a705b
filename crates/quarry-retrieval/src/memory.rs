use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::{
    cosine_similarity, Chunk, ChunkStore, Embeddings, Filters, QuarryError, VectorHit,
    VectorIndex,
};
use tokio::sync::RwLock;

/// In-memory corpus acting as both vector index and chunk store.
///
/// Similarity is cosine over each chunk's precomputed embedding; chunks
/// without an embedding are never returned by [`VectorIndex::search`].
pub struct InMemoryCorpus {
    chunks: RwLock<HashMap<String, Arc<Chunk>>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
        }
    }

    /// Create a corpus from chunks that already carry embeddings.
    pub fn from_chunks(chunks: impl IntoIterator<Item = Chunk>) -> Self {
        let map = chunks
            .into_iter()
            .map(|chunk| (chunk.id.clone(), Arc::new(chunk)))
            .collect();
        Self {
            chunks: RwLock::new(map),
        }
    }

    /// Create a corpus, computing embeddings for chunks that lack one.
    pub async fn from_chunks_embedded(
        chunks: Vec<Chunk>,
        embeddings: &dyn Embeddings,
    ) -> Result<Self, QuarryError> {
        let corpus = Self::new();
        corpus.add_chunks(chunks, embeddings).await?;
        Ok(corpus)
    }

    /// Insert chunks, embedding the content of any chunk without a vector.
    pub async fn add_chunks(
        &self,
        mut chunks: Vec<Chunk>,
        embeddings: &dyn Embeddings,
    ) -> Result<Vec<String>, QuarryError> {
        let missing: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.embedding.is_empty())
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            let texts: Vec<&str> = missing.iter().map(|&i| chunks[i].content.as_str()).collect();
            let vectors = embeddings.embed_documents(&texts).await?;
            for (idx, vector) in missing.into_iter().zip(vectors) {
                chunks[idx].embedding = vector;
            }
        }

        let mut entries = self.chunks.write().await;
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            ids.push(chunk.id.clone());
            entries.insert(chunk.id.clone(), Arc::new(chunk));
        }
        Ok(ids)
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.chunks.write().await.remove(id).is_some()
    }

    /// Snapshot of all chunks, ordered by id.
    pub async fn chunks(&self) -> Vec<Arc<Chunk>> {
        let mut all: Vec<Arc<Chunk>> = self.chunks.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

impl Default for InMemoryCorpus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryCorpus {
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: &Filters,
    ) -> Result<Vec<VectorHit>, QuarryError> {
        let entries = self.chunks.read().await;

        let mut scored: Vec<VectorHit> = entries
            .values()
            .filter(|chunk| !chunk.embedding.is_empty() && chunk.matches(filters))
            .map(|chunk| VectorHit {
                chunk_id: chunk.id.clone(),
                score: cosine_similarity(vector, &chunk.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(k);

        Ok(scored)
    }
}

#[async_trait]
impl ChunkStore for InMemoryCorpus {
    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, Arc<Chunk>>, QuarryError> {
        let entries = self.chunks.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id).map(|chunk| (id.clone(), chunk.clone())))
            .collect())
    }
}

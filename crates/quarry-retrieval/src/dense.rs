use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::{
    Chunk, ChunkStore, QuarryError, RetrievalRequest, RetrievalResult, Retriever, VectorIndex,
};

/// Similarity search over an external vector index.
///
/// Index hits are resolved to chunks through the corpus store. Any failure of
/// either collaborator surfaces as [`QuarryError::RetrievalUnavailable`] so the
/// caller can continue with sparse results alone.
pub struct DenseRetriever {
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn ChunkStore>,
}

impl DenseRetriever {
    pub fn new(index: Arc<dyn VectorIndex>, store: Arc<dyn ChunkStore>) -> Self {
        Self { index, store }
    }
}

fn unavailable(collaborator: &str, err: QuarryError) -> QuarryError {
    match err {
        QuarryError::RetrievalUnavailable(_) | QuarryError::Cancelled => err,
        other => QuarryError::RetrievalUnavailable(format!("{collaborator}: {other}")),
    }
}

#[async_trait]
impl Retriever for DenseRetriever {
    fn name(&self) -> &str {
        "dense"
    }

    async fn retrieve(
        &self,
        request: &RetrievalRequest<'_>,
    ) -> Result<Vec<RetrievalResult>, QuarryError> {
        let vector = request.vector.ok_or_else(|| {
            QuarryError::RetrievalUnavailable("dense retrieval requires a query vector".to_string())
        })?;
        if request.k == 0 {
            return Ok(Vec::new());
        }

        let hits = self
            .index
            .search(vector, request.k, request.filters)
            .await
            .map_err(|e| unavailable("vector index", e))?;

        let ids: Vec<String> = hits.iter().map(|h| h.chunk_id.clone()).collect();
        let chunks = self
            .store
            .fetch(&ids)
            .await
            .map_err(|e| unavailable("chunk store", e))?;

        let scored: Vec<(Arc<Chunk>, f32)> = hits
            .into_iter()
            .filter_map(|hit| match chunks.get(&hit.chunk_id) {
                Some(chunk) => Some((chunk.clone(), hit.score)),
                None => {
                    tracing::debug!(
                        chunk_id = %hit.chunk_id,
                        "vector hit missing from chunk store"
                    );
                    None
                }
            })
            .collect();

        Ok(RetrievalResult::ranked(self.name(), scored, request.k))
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::{
    Chunk, Filters, QuarryError, RetrievalRequest, RetrievalResult, Retriever,
};
use tokio::sync::RwLock;

use crate::Tokenizer;

/// Okapi BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term saturation parameter (default 1.5).
    pub k1: f64,
    /// Length normalization parameter (default 0.75).
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

struct IndexedChunk {
    chunk: Arc<Chunk>,
    length: usize,
}

#[derive(Default)]
struct IndexState {
    chunks: HashMap<String, IndexedChunk>,
    /// term -> chunk id -> term frequency
    postings: HashMap<String, HashMap<String, u32>>,
    total_length: usize,
}

impl IndexState {
    fn insert(&mut self, chunk: Arc<Chunk>, tokenizer: &Tokenizer) {
        self.remove(&chunk.id);

        let tokens = tokenizer.tokenize(&chunk.content);
        let mut term_freq: HashMap<String, u32> = HashMap::new();
        for token in tokens.iter() {
            *term_freq.entry(token.clone()).or_insert(0) += 1;
        }
        for (term, tf) in term_freq {
            self.postings
                .entry(term)
                .or_default()
                .insert(chunk.id.clone(), tf);
        }

        self.total_length += tokens.len();
        self.chunks.insert(
            chunk.id.clone(),
            IndexedChunk {
                chunk,
                length: tokens.len(),
            },
        );
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(indexed) = self.chunks.remove(id) else {
            return false;
        };
        self.total_length -= indexed.length;
        self.postings.retain(|_, docs| {
            docs.remove(id);
            !docs.is_empty()
        });
        true
    }

    fn avg_length(&self) -> f64 {
        if self.chunks.is_empty() {
            0.0
        } else {
            self.total_length as f64 / self.chunks.len() as f64
        }
    }
}

/// Inverted keyword index with BM25 ranking: the sparse retriever.
///
/// Built once at corpus-load time and updated incrementally through
/// [`add`](Self::add) / [`remove`](Self::remove). A search holds the read
/// lock for its whole postings walk, so writes never interleave with an
/// in-flight lookup.
pub struct KeywordIndex {
    state: RwLock<IndexState>,
    tokenizer: Tokenizer,
    params: Bm25Params,
}

impl KeywordIndex {
    /// Create an empty index with default BM25 parameters and no stemming.
    pub fn new() -> Self {
        Self::with_params(Bm25Params::default(), Tokenizer::default())
    }

    pub fn with_params(params: Bm25Params, tokenizer: Tokenizer) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            tokenizer,
            params,
        }
    }

    /// Build an index over an initial corpus.
    pub fn build(
        chunks: impl IntoIterator<Item = Arc<Chunk>>,
        params: Bm25Params,
        tokenizer: Tokenizer,
    ) -> Self {
        let mut state = IndexState::default();
        for chunk in chunks {
            state.insert(chunk, &tokenizer);
        }
        Self {
            state: RwLock::new(state),
            tokenizer,
            params,
        }
    }

    /// Add or replace a chunk.
    pub async fn add(&self, chunk: Arc<Chunk>) {
        self.state.write().await.insert(chunk, &self.tokenizer);
    }

    pub async fn add_all(&self, chunks: impl IntoIterator<Item = Arc<Chunk>>) {
        let mut state = self.state.write().await;
        for chunk in chunks {
            state.insert(chunk, &self.tokenizer);
        }
    }

    /// Remove a chunk. Returns `false` if it was not indexed.
    pub async fn remove(&self, id: &str) -> bool {
        self.state.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.chunks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.chunks.is_empty()
    }

    /// Rank indexed chunks by BM25 against `query`.
    ///
    /// Empty or fully out-of-vocabulary queries return an empty list.
    pub async fn search(&self, query: &str, k: usize, filters: &Filters) -> Vec<RetrievalResult> {
        let mut seen = HashSet::new();
        let query_terms: Vec<String> = self
            .tokenizer
            .tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        if query_terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let state = self.state.read().await;
        let n = state.chunks.len() as f64;
        let avg_len = state.avg_length();
        let mut scores: HashMap<&str, f64> = HashMap::new();

        for term in &query_terms {
            let Some(docs) = state.postings.get(term) else {
                continue;
            };
            let df = docs.len() as f64;
            // IDF: ln((N - df + 0.5) / (df + 0.5) + 1)
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for (id, tf) in docs {
                let Some(indexed) = state.chunks.get(id) else {
                    continue;
                };
                let tf = *tf as f64;
                let doc_len = indexed.length as f64;
                let denominator = tf
                    + self.params.k1
                        * (1.0 - self.params.b + self.params.b * doc_len / avg_len);
                *scores.entry(id.as_str()).or_insert(0.0) +=
                    idf * tf * (self.params.k1 + 1.0) / denominator;
            }
        }

        let scored: Vec<(Arc<Chunk>, f32)> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .filter_map(|(id, score)| {
                let chunk = &state.chunks.get(id)?.chunk;
                chunk.matches(filters).then(|| (chunk.clone(), score as f32))
            })
            .collect();

        RetrievalResult::ranked(self.name(), scored, k)
    }
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Retriever for KeywordIndex {
    fn name(&self) -> &str {
        "sparse"
    }

    async fn retrieve(
        &self,
        request: &RetrievalRequest<'_>,
    ) -> Result<Vec<RetrievalResult>, QuarryError> {
        Ok(self.search(request.text, request.k, request.filters).await)
    }
}

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// An immutable unit of retrievable text, owned by the corpus.
///
/// The embedding is precomputed at ingestion time; the pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// Ordinal position of the chunk within its document.
    pub position: usize,
    pub content: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        position: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            position,
            content: content.into(),
            metadata: HashMap::new(),
            embedding: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// True if every filter key is present in the metadata with an equal value.
    pub fn matches(&self, filters: &Filters) -> bool {
        filters
            .iter()
            .all(|(key, value)| self.metadata.get(key) == Some(value))
    }
}

/// Equality filters over chunk metadata.
pub type Filters = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// Query / SubQuery
// ---------------------------------------------------------------------------

/// A natural-language query plus the name of the profile that should serve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub text: String,
    /// Name of the profile selecting which stages run. `None` uses the default profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub filters: Filters,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            profile: None,
            filters: HashMap::new(),
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.filters.insert(key.into(), value);
        self
    }
}

/// A fragment of a query produced by decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuery {
    pub parent_id: Uuid,
    /// Ordinal position among the parent's sub-queries, used for stable merge ordering.
    pub index: usize,
    pub text: String,
}

impl SubQuery {
    pub fn new(parent: &Query, index: usize, text: impl Into<String>) -> Self {
        Self {
            parent_id: parent.id,
            index,
            text: text.into(),
        }
    }

    /// Source label used when this sub-query's fused list enters cross-sub-query fusion.
    pub fn source_name(&self) -> String {
        format!("subquery-{}", self.index)
    }
}

// ---------------------------------------------------------------------------
// Ranked results
// ---------------------------------------------------------------------------

/// One ranked hit from a single retriever invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub chunk: Arc<Chunk>,
    /// Raw retriever score, higher is more relevant.
    pub score: f32,
    /// 1-based rank within the retriever's list.
    pub rank: usize,
    pub retriever: String,
}

impl RetrievalResult {
    /// Sort scored chunks descending (ties by chunk id), keep the first `k`, and assign ranks.
    pub fn ranked(
        retriever: &str,
        mut scored: Vec<(Arc<Chunk>, f32)>,
        k: usize,
    ) -> Vec<RetrievalResult> {
        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        scored.truncate(k);
        scored
            .into_iter()
            .enumerate()
            .map(|(idx, (chunk, score))| RetrievalResult {
                chunk,
                score,
                rank: idx + 1,
                retriever: retriever.to_string(),
            })
            .collect()
    }
}

/// A named ranked list, one of the inputs to rank fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    pub source: String,
    pub results: Vec<RetrievalResult>,
}

impl RankedList {
    pub fn new(source: impl Into<String>, results: Vec<RetrievalResult>) -> Self {
        Self {
            source: source.into(),
            results,
        }
    }

    /// Turn a fused ranking into an input list for a secondary fusion pass.
    pub fn from_fused(source: impl Into<String>, fused: &[FusedResult]) -> Self {
        let source = source.into();
        let results = fused
            .iter()
            .enumerate()
            .map(|(idx, hit)| RetrievalResult {
                chunk: hit.chunk.clone(),
                score: hit.score as f32,
                rank: idx + 1,
                retriever: source.clone(),
            })
            .collect();
        Self { source, results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Rank a chunk held in one contributing list.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub source: String,
    pub rank: usize,
    pub score: f32,
}

/// One entry of a consensus ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub chunk: Arc<Chunk>,
    pub score: f64,
    pub contributions: Vec<Contribution>,
}

impl FusedResult {
    /// Best (smallest) rank this chunk held in any contributing list.
    pub fn best_rank(&self) -> usize {
        self.contributions
            .iter()
            .map(|c| c.rank)
            .min()
            .unwrap_or(usize::MAX)
    }

    /// Fused-list ordering: score descending, then best rank, then chunk id.
    pub fn ordering(a: &FusedResult, b: &FusedResult) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.best_rank().cmp(&b.best_rank()))
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    }
}

/// A fused result after the reranking stage.
///
/// `reranker_score` is `None` for entries beyond the reranked prefix (or when
/// reranking was skipped); those keep their fused position.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankedResult {
    pub chunk: Arc<Chunk>,
    pub reranker_score: Option<f32>,
    pub fused_score: f64,
    /// 1-based position in the fused list.
    pub fused_rank: usize,
}

impl RerankedResult {
    pub fn passthrough(fused: &[FusedResult]) -> Vec<RerankedResult> {
        fused
            .iter()
            .enumerate()
            .map(|(idx, hit)| RerankedResult {
                chunk: hit.chunk.clone(),
                reranker_score: None,
                fused_score: hit.score,
                fused_rank: idx + 1,
            })
            .collect()
    }
}

/// Byte range of one retained sentence within the original chunk content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceSpan {
    pub start: usize,
    pub end: usize,
}

impl SentenceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A chunk reduced to its most query-relevant sentences. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedChunk {
    pub chunk: Arc<Chunk>,
    pub text: String,
    pub spans: Vec<SentenceSpan>,
    /// Output length divided by original length.
    pub ratio: f32,
}

impl CompressedChunk {
    /// The chunk's full content, as returned when compression did not run.
    pub fn uncompressed(chunk: Arc<Chunk>) -> Self {
        let end = chunk.content.len();
        Self {
            text: chunk.content.clone(),
            spans: vec![SentenceSpan::new(0, end)],
            ratio: 1.0,
            chunk,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline stages and degradation
// ---------------------------------------------------------------------------

/// States of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Enhancing,
    Retrieving,
    Fusing,
    Reranking,
    Compressing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Enhancing => "enhancing",
            Stage::Retrieving => "retrieving",
            Stage::Fusing => "fusing",
            Stage::Reranking => "reranking",
            Stage::Compressing => "compressing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why a stage fell back to a degraded path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationReason {
    RetrievalUnavailable,
    EnhancementLowConfidence,
    EnhancementFailed,
    RerankUnavailable,
    CompressionDegenerate,
    /// The compressor's embedding model failed; chunks pass through uncompressed.
    CompressionUnavailable,
    TimeoutExceeded,
}

/// A recorded fallback. Degradations are data, never control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    pub stage: Stage,
    pub reason: DegradationReason,
    pub detail: String,
}

impl Degradation {
    pub fn new(stage: Stage, reason: DegradationReason, detail: impl Into<String>) -> Self {
        Self {
            stage,
            reason,
            detail: detail.into(),
        }
    }
}

/// A value plus the degradations incurred while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub degradations: Vec<Degradation>,
}

impl<T> Outcome<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            degradations: Vec::new(),
        }
    }

    pub fn degraded(value: T, degradation: Degradation) -> Self {
        Self {
            value,
            degradations: vec![degradation],
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn has_reason(&self, reason: DegradationReason) -> bool {
        self.degradations.iter().any(|d| d.reason == reason)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            degradations: self.degradations,
        }
    }

    pub fn into_parts(self) -> (T, Vec<Degradation>) {
        (self.value, self.degradations)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for Quarry collaborators and stages.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QuarryError {
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),
    #[error("rerank unavailable: {0}")]
    RerankUnavailable(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("generation error: {0}")]
    Generation(String),
    #[error("index error: {0}")]
    Index(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("config error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("parsing error: {0}")]
    Parsing(String),
}

// ---------------------------------------------------------------------------
// Embeddings trait
// ---------------------------------------------------------------------------

/// Trait for embedding text into vectors.
///
/// Implementations must be deterministic for a fixed (text, model) pair.
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Identifier of the underlying model, part of every cache key.
    fn model_id(&self) -> &str;

    /// Embed multiple texts (for batch document embedding).
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, QuarryError>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, QuarryError>;
}

// ---------------------------------------------------------------------------
// Vector index / corpus store
// ---------------------------------------------------------------------------

/// A chunk id and its similarity score as returned by a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub score: f32,
}

/// External similarity index. Read-only from the pipeline's perspective.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: &Filters,
    ) -> Result<Vec<VectorHit>, QuarryError>;
}

/// Supplies chunk text and metadata by chunk id.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Fetch the chunks that exist among `ids`; unknown ids are omitted.
    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, Arc<Chunk>>, QuarryError>;
}

// ---------------------------------------------------------------------------
// Generation model
// ---------------------------------------------------------------------------

/// A prompt for the generation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Generated text with a confidence signal in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub confidence: f32,
}

impl Generation {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Confidence from per-token log-probabilities: `exp(mean(logprob))`.
    pub fn from_log_probs(text: impl Into<String>, log_probs: &[f32]) -> Self {
        let confidence = if log_probs.is_empty() {
            0.0
        } else {
            let mean = log_probs.iter().sum::<f32>() / log_probs.len() as f32;
            mean.exp()
        };
        Self::new(text, confidence)
    }
}

/// Text generation collaborator.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, QuarryError>;
}

// ---------------------------------------------------------------------------
// Reranking model
// ---------------------------------------------------------------------------

/// Pairwise (query, passage) relevance model.
#[async_trait]
pub trait RerankModel: Send + Sync {
    /// Score each passage against the query. The output has one score per input, in order.
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, QuarryError>;
}

// ---------------------------------------------------------------------------
// Retriever trait
// ---------------------------------------------------------------------------

/// Input to a single retriever invocation.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalRequest<'a> {
    /// Literal query text, used by lexical retrievers.
    pub text: &'a str,
    /// Query vector, used by dense retrievers.
    pub vector: Option<&'a [f32]>,
    pub k: usize,
    pub filters: &'a Filters,
}

/// A ranked retriever over the corpus.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Identity of the list this retriever produces, used as the fusion source name.
    fn name(&self) -> &str;

    async fn retrieve(
        &self,
        request: &RetrievalRequest<'_>,
    ) -> Result<Vec<RetrievalResult>, QuarryError>;
}

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use quarry_core::{
    cosine_similarity, Chunk, CompressedChunk, Degradation, DegradationReason, Embeddings, Outcome,
    QuarryError, SentenceSpan, Stage,
};
use serde::{Deserialize, Serialize};

use crate::split_sentences;

/// Compression parameters. Lengths are in bytes of UTF-8 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Fraction of the original length to aim for, in `(0, 1]`. A soft target.
    pub target_ratio: f32,
    /// Sentences kept on each side of a selected sentence.
    pub window: usize,
    /// Chunks at or below this length are returned whole.
    pub min_length: usize,
    /// Hard cap on output length.
    pub max_length: usize,
    /// Sentences scoring below this similarity are never selected on their own merit.
    pub min_relevance: f32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            target_ratio: 0.6,
            window: 1,
            min_length: 120,
            max_length: 2000,
            min_relevance: 0.0,
        }
    }
}

impl CompressionConfig {
    pub fn with_target_ratio(mut self, ratio: f32) -> Self {
        self.target_ratio = ratio;
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    pub fn with_length_bounds(mut self, min_length: usize, max_length: usize) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self
    }

    pub fn validate(&self) -> Result<(), QuarryError> {
        if !(self.target_ratio > 0.0 && self.target_ratio <= 1.0) {
            return Err(QuarryError::Validation(format!(
                "compression target ratio must be in (0, 1], got {}",
                self.target_ratio
            )));
        }
        if self.max_length == 0 || self.min_length > self.max_length {
            return Err(QuarryError::Validation(format!(
                "compression length bounds invalid: min {} max {}",
                self.min_length, self.max_length
            )));
        }
        Ok(())
    }

    /// Output length aimed for when compressing `len` bytes.
    fn budget(&self, len: usize) -> usize {
        let target = (len as f32 * self.target_ratio).ceil() as usize;
        target.max(self.min_length).min(self.max_length)
    }
}

/// Reduces chunks to the sentences most similar to the query.
///
/// Sentences are scored by embedding similarity to the query and picked
/// greedily, best first, each with `window` neighbours on either side, until
/// the length budget is reached. Output keeps document order. A non-empty
/// chunk never compresses to nothing: if no sentence qualifies, or sentence
/// embedding fails, the original is returned truncated to the budget.
pub struct ContextualCompressor {
    embeddings: Arc<dyn Embeddings>,
    config: CompressionConfig,
}

impl ContextualCompressor {
    pub fn new(embeddings: Arc<dyn Embeddings>) -> Self {
        Self {
            embeddings,
            config: CompressionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CompressionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Compress one chunk against `query`.
    pub async fn compress(&self, query: &str, chunk: Arc<Chunk>) -> Outcome<CompressedChunk> {
        match self.embeddings.embed_query(query).await {
            Ok(vector) => self.compress_with_vector(&vector, chunk).await,
            Err(e) => self.unavailable(chunk, format!("query embedding failed: {e}")),
        }
    }

    /// Compress many chunks concurrently, embedding the query once. Output order matches input.
    pub async fn compress_all(
        &self,
        query: &str,
        chunks: Vec<Arc<Chunk>>,
    ) -> Outcome<Vec<CompressedChunk>> {
        let vector = match self.embeddings.embed_query(query).await {
            Ok(vector) => vector,
            Err(e) => {
                let detail = format!("query embedding failed: {e}");
                return merge(
                    chunks
                        .into_iter()
                        .map(|c| self.unavailable(c, detail.clone()))
                        .collect(),
                );
            }
        };

        let outcomes = join_all(
            chunks
                .into_iter()
                .map(|chunk| self.compress_with_vector(&vector, chunk)),
        )
        .await;
        merge(outcomes)
    }

    /// Compress one chunk against a precomputed query vector.
    pub async fn compress_with_vector(
        &self,
        query_vector: &[f32],
        chunk: Arc<Chunk>,
    ) -> Outcome<CompressedChunk> {
        let content = chunk.content.as_str();
        let spans = split_sentences(content);
        if content.len() <= self.config.min_length || spans.len() <= 1 {
            return Outcome::clean(self.whole(chunk));
        }

        let sentences: Vec<&str> = spans.iter().map(|s| &content[s.start..s.end]).collect();
        let vectors = match self.embeddings.embed_documents(&sentences).await {
            Ok(v) if v.len() == sentences.len() => v,
            Ok(v) => {
                let detail = format!(
                    "expected {} sentence embeddings, got {}",
                    sentences.len(),
                    v.len()
                );
                return self.fallback(chunk, detail);
            }
            Err(e) => return self.unavailable(chunk, format!("sentence embedding failed: {e}")),
        };
        let scores: Vec<f32> = vectors
            .iter()
            .map(|v| cosine_similarity(query_vector, v))
            .collect();

        let selected = self.select(&spans, &scores, content.len());
        if selected.is_empty() {
            return self.fallback(chunk, "no sentence met the relevance threshold".to_string());
        }

        let kept: Vec<SentenceSpan> = selected.into_iter().map(|i| spans[i]).collect();
        let joined = kept
            .iter()
            .map(|s| &content[s.start..s.end])
            .collect::<Vec<_>>()
            .join(" ");
        let text = truncate(&joined, self.config.max_length).to_string();
        let kept = clip_spans(&kept, text.len());
        let ratio = text.len() as f32 / content.len() as f32;

        tracing::trace!(chunk_id = %chunk.id, sentences = kept.len(), ratio, "chunk compressed");
        Outcome::clean(CompressedChunk {
            chunk,
            text,
            spans: kept,
            ratio,
        })
    }

    /// Greedy selection of sentence indices, returned in document order.
    fn select(
        &self,
        spans: &[SentenceSpan],
        scores: &[f32],
        original_len: usize,
    ) -> BTreeSet<usize> {
        let budget = self.config.budget(original_len);
        let mut order: Vec<usize> = (0..spans.len())
            .filter(|&i| scores[i] >= self.config.min_relevance)
            .collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then_with(|| a.cmp(&b)));

        let mut selected = BTreeSet::new();
        let mut used = 0;
        for idx in order {
            if used >= budget {
                break;
            }
            let lo = idx.saturating_sub(self.config.window);
            let hi = (idx + self.config.window).min(spans.len() - 1);
            let added: Vec<usize> = (lo..=hi).filter(|i| !selected.contains(i)).collect();
            // sentence lengths plus one joining space each
            let cost: usize = added.iter().map(|&i| spans[i].len() + 1).sum();
            if !selected.is_empty() && used + cost > budget {
                continue;
            }
            used += cost;
            selected.extend(added);
        }
        selected
    }

    fn whole(&self, chunk: Arc<Chunk>) -> CompressedChunk {
        if chunk.content.len() <= self.config.max_length {
            return CompressedChunk::uncompressed(chunk);
        }
        self.truncated(chunk, self.config.max_length)
    }

    fn truncated(&self, chunk: Arc<Chunk>, limit: usize) -> CompressedChunk {
        let text = truncate(&chunk.content, limit).to_string();
        let ratio = if chunk.content.is_empty() {
            1.0
        } else {
            text.len() as f32 / chunk.content.len() as f32
        };
        let leading = chunk.content.len() - chunk.content.trim_start().len();
        CompressedChunk {
            spans: vec![SentenceSpan::new(leading, leading + text.len())],
            text,
            ratio,
            chunk,
        }
    }

    fn fallback(&self, chunk: Arc<Chunk>, detail: String) -> Outcome<CompressedChunk> {
        self.truncate_with(chunk, DegradationReason::CompressionDegenerate, detail)
    }

    /// Fallback for an embedding model that could not score the chunk.
    fn unavailable(&self, chunk: Arc<Chunk>, detail: String) -> Outcome<CompressedChunk> {
        self.truncate_with(chunk, DegradationReason::CompressionUnavailable, detail)
    }

    fn truncate_with(
        &self,
        chunk: Arc<Chunk>,
        reason: DegradationReason,
        detail: String,
    ) -> Outcome<CompressedChunk> {
        tracing::debug!(
            chunk_id = %chunk.id,
            %detail,
            "compression fell back to truncated original"
        );
        let limit = self.config.budget(chunk.content.len());
        Outcome::degraded(
            self.truncated(chunk, limit),
            Degradation::new(Stage::Compressing, reason, detail),
        )
    }
}

/// Cut `text` to at most `limit` bytes, preferring a word boundary.
///
/// Never returns an empty string for text with non-whitespace content.
fn truncate(text: &str, limit: usize) -> &str {
    let text = text.trim();
    if text.len() <= limit {
        return text;
    }
    let mut cut = limit.max(1);
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    if cut == 0 {
        // the first character alone exceeds the limit
        cut = text.chars().next().map_or(0, char::len_utf8);
    }
    let head = &text[..cut];
    match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => head[..space].trim_end(),
        _ => head,
    }
}

/// Spans covering the first `len` bytes of their space-joined text.
fn clip_spans(spans: &[SentenceSpan], len: usize) -> Vec<SentenceSpan> {
    let mut offset = 0;
    let mut clipped = Vec::with_capacity(spans.len());
    for span in spans {
        if offset >= len {
            break;
        }
        let covered = (span.end - span.start).min(len - offset);
        clipped.push(SentenceSpan::new(span.start, span.start + covered));
        offset += span.end - span.start + 1;
    }
    clipped
}

fn merge(outcomes: Vec<Outcome<CompressedChunk>>) -> Outcome<Vec<CompressedChunk>> {
    let mut values = Vec::with_capacity(outcomes.len());
    let mut degradations = Vec::new();
    for outcome in outcomes {
        let (value, mut d) = outcome.into_parts();
        values.push(value);
        degradations.append(&mut d);
    }
    Outcome {
        value: values,
        degradations,
    }
}

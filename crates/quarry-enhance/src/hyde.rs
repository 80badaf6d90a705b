use std::sync::Arc;

use dashmap::DashMap;
use quarry_core::{
    Degradation, DegradationReason, Embeddings, Generation, GenerationRequest, Generator, Outcome,
    QuarryError, Stage,
};

/// Confidence below which a hypothetical answer is discarded.
pub const DEFAULT_HYDE_THRESHOLD: f32 = 0.5;

/// Where a dense query vector came from.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorOrigin {
    /// Embedding of the literal query text.
    Literal,
    /// Embedding of a generated hypothetical answer.
    Hypothetical { text: String, confidence: f32 },
}

/// The vector handed to dense retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryVector {
    pub vector: Vec<f32>,
    pub origin: VectorOrigin,
}

impl QueryVector {
    pub fn is_hypothetical(&self) -> bool {
        matches!(self.origin, VectorOrigin::Hypothetical { .. })
    }
}

/// Hypothetical-document rewriting for dense retrieval.
///
/// Generates a plausible answer to the query, embeds it, and returns that
/// vector in place of the literal query embedding. The hypothetical answer is
/// gated on the generator's confidence: below the threshold, or on any
/// generation or embedding failure, the literal embedding is used and the
/// fallback is reported as a degradation. Sparse retrieval never sees the
/// hypothetical text.
///
/// Hypothetical answers are cached per query text, so rewriting the same query
/// twice embeds the same text.
pub struct HydeRewriter {
    generator: Arc<dyn Generator>,
    embeddings: Arc<dyn Embeddings>,
    threshold: f32,
    answers: DashMap<String, Generation>,
}

impl HydeRewriter {
    pub fn new(generator: Arc<dyn Generator>, embeddings: Arc<dyn Embeddings>) -> Self {
        Self {
            generator,
            embeddings,
            threshold: DEFAULT_HYDE_THRESHOLD,
            answers: DashMap::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn prompt(query: &str) -> String {
        format!(
            "Write a short passage that directly answers the question below, as it \
             might appear in a reference document. Do not mention the question.\n\n\
             Question: {query}\n\nPassage:"
        )
    }

    async fn hypothetical(&self, query: &str) -> Result<Generation, QuarryError> {
        if let Some(cached) = self.answers.get(query) {
            return Ok(cached.clone());
        }
        let request = GenerationRequest::new(Self::prompt(query)).with_max_tokens(256);
        let generation = self.generator.generate(request).await?;
        Ok(self
            .answers
            .entry(query.to_string())
            .or_insert(generation)
            .clone())
    }

    async fn literal(&self, query: &str) -> Result<QueryVector, QuarryError> {
        Ok(QueryVector {
            vector: self.embeddings.embed_query(query).await?,
            origin: VectorOrigin::Literal,
        })
    }

    /// Produce the dense query vector for `query`.
    ///
    /// Only fails if the literal query itself cannot be embedded (or the
    /// request was cancelled); every HyDE failure falls back to the literal vector.
    pub async fn rewrite(&self, query: &str) -> Result<Outcome<QueryVector>, QuarryError> {
        self.rewrite_with_threshold(query, self.threshold).await
    }

    /// [`rewrite`](Self::rewrite) with a per-call confidence threshold.
    pub async fn rewrite_with_threshold(
        &self,
        query: &str,
        threshold: f32,
    ) -> Result<Outcome<QueryVector>, QuarryError> {
        let degradation = match self.hypothetical(query).await {
            Ok(generation) if generation.text.trim().is_empty() => Degradation::new(
                Stage::Enhancing,
                DegradationReason::EnhancementFailed,
                "hypothetical answer was empty",
            ),
            Ok(generation) if generation.confidence < threshold => {
                tracing::debug!(
                    confidence = generation.confidence,
                    threshold,
                    "hypothetical answer below confidence threshold"
                );
                Degradation::new(
                    Stage::Enhancing,
                    DegradationReason::EnhancementLowConfidence,
                    format!(
                        "confidence {:.3} below threshold {:.3}",
                        generation.confidence, threshold
                    ),
                )
            }
            Ok(generation) => match self.embeddings.embed_query(&generation.text).await {
                Ok(vector) => {
                    return Ok(Outcome::clean(QueryVector {
                        vector,
                        origin: VectorOrigin::Hypothetical {
                            text: generation.text,
                            confidence: generation.confidence,
                        },
                    }))
                }
                Err(QuarryError::Cancelled) => return Err(QuarryError::Cancelled),
                Err(e) => Degradation::new(
                    Stage::Enhancing,
                    DegradationReason::EnhancementFailed,
                    format!("embedding hypothetical answer failed: {e}"),
                ),
            },
            Err(QuarryError::Cancelled) => return Err(QuarryError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "hypothetical answer generation failed");
                Degradation::new(
                    Stage::Enhancing,
                    DegradationReason::EnhancementFailed,
                    format!("generation failed: {e}"),
                )
            }
        };

        Ok(Outcome::degraded(self.literal(query).await?, degradation))
    }
}

use std::collections::HashSet;

use async_trait::async_trait;
use quarry_core::{QuarryError, RerankModel};
use quarry_retrieval::Tokenizer;

/// Configuration for the lexical rerank model.
#[derive(Debug, Clone)]
pub struct LexicalRerankConfig {
    /// Term frequency saturation (default: 1.5).
    pub k1: f32,
    /// Passage length normalization, 0 = none, 1 = full (default: 0.75).
    pub b: f32,
    /// Reference passage length in tokens used for length normalization (default: 64).
    pub reference_length: f32,
}

impl Default for LexicalRerankConfig {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            reference_length: 64.0,
        }
    }
}

impl LexicalRerankConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_k1(mut self, k1: f32) -> Self {
        self.k1 = k1;
        self
    }

    pub fn with_b(mut self, b: f32) -> Self {
        self.b = b;
        self
    }
}

/// In-process rerank model using BM25-style term saturation.
///
/// Each passage is scored independently of the others in its batch, so
/// results do not depend on how candidates are batched. The score is the mean
/// over distinct query terms of the saturated, length-normalized term
/// frequency, in `[0, k1 + 1]`.
pub struct LexicalRerankModel {
    config: LexicalRerankConfig,
    tokenizer: Tokenizer,
}

impl LexicalRerankModel {
    pub fn new(config: LexicalRerankConfig) -> Self {
        Self {
            config,
            tokenizer: Tokenizer::new().with_stemming(true),
        }
    }

    fn score_passage(&self, query_terms: &[String], passage: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let tokens = self.tokenizer.tokenize(passage);
        let dl = tokens.len() as f32;
        let LexicalRerankConfig {
            k1,
            b,
            reference_length,
        } = self.config;

        let total: f32 = query_terms
            .iter()
            .map(|term| {
                let tf = tokens.iter().filter(|t| *t == term).count() as f32;
                if tf == 0.0 {
                    return 0.0;
                }
                (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * dl / reference_length.max(1.0)))
            })
            .sum();
        total / query_terms.len() as f32
    }
}

impl Default for LexicalRerankModel {
    fn default() -> Self {
        Self::new(LexicalRerankConfig::default())
    }
}

#[async_trait]
impl RerankModel for LexicalRerankModel {
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, QuarryError> {
        let mut seen = HashSet::new();
        let query_terms: Vec<String> = self
            .tokenizer
            .tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        Ok(passages
            .iter()
            .map(|p| self.score_passage(&query_terms, p))
            .collect())
    }
}

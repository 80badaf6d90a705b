use std::sync::Arc;

use futures::future::try_join_all;
use quarry_core::{
    Degradation, DegradationReason, FusedResult, Outcome, QuarryError, RerankModel,
    RerankedResult, Stage,
};

/// Default number of fused candidates sent to the rerank model.
pub const DEFAULT_RERANK_TOP_N: usize = 20;
/// Default number of passages per rerank model call.
pub const DEFAULT_RERANK_BATCH_SIZE: usize = 8;

/// The reranking stage.
pub struct Reranker {
    model: Arc<dyn RerankModel>,
    top_n: usize,
    batch_size: usize,
}

impl Reranker {
    pub fn new(model: Arc<dyn RerankModel>) -> Self {
        Self {
            model,
            top_n: DEFAULT_RERANK_TOP_N,
            batch_size: DEFAULT_RERANK_BATCH_SIZE,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Rerank the first `top_n` entries of `fused`.
    ///
    /// The reranked prefix is sorted by model score (ties keep fused order);
    /// the remainder follows with its fused rank and no reranker score. On any
    /// model failure the whole list is passed through in fused order and a
    /// `RerankUnavailable` degradation is recorded.
    pub async fn rerank(&self, query: &str, fused: &[FusedResult]) -> Outcome<Vec<RerankedResult>> {
        let head_len = self.top_n.min(fused.len());
        if head_len == 0 {
            return Outcome::clean(RerankedResult::passthrough(fused));
        }

        match self.score_head(query, &fused[..head_len]).await {
            Ok(scores) => {
                let mut reranked: Vec<RerankedResult> = fused[..head_len]
                    .iter()
                    .zip(scores)
                    .enumerate()
                    .map(|(idx, (hit, score))| RerankedResult {
                        chunk: hit.chunk.clone(),
                        reranker_score: Some(score),
                        fused_score: hit.score,
                        fused_rank: idx + 1,
                    })
                    .collect();
                reranked.sort_by(|a, b| {
                    let sa = a.reranker_score.unwrap_or(f32::MIN);
                    let sb = b.reranker_score.unwrap_or(f32::MIN);
                    sb.total_cmp(&sa)
                        .then_with(|| a.fused_rank.cmp(&b.fused_rank))
                });
                reranked.extend(RerankedResult::passthrough(fused).into_iter().skip(head_len));
                tracing::debug!(reranked = head_len, total = fused.len(), "rerank complete");
                Outcome::clean(reranked)
            }
            Err(e) => {
                tracing::warn!(error = %e, "rerank model unavailable, keeping fused order");
                Outcome::degraded(
                    RerankedResult::passthrough(fused),
                    Degradation::new(
                        Stage::Reranking,
                        DegradationReason::RerankUnavailable,
                        e.to_string(),
                    ),
                )
            }
        }
    }

    async fn score_head(&self, query: &str, head: &[FusedResult]) -> Result<Vec<f32>, QuarryError> {
        let passages: Vec<&str> = head.iter().map(|hit| hit.chunk.content.as_str()).collect();
        let batches = passages.chunks(self.batch_size.max(1)).map(|batch| async move {
            let scores = self.model.score(query, batch).await?;
            if scores.len() != batch.len() {
                return Err(QuarryError::RerankUnavailable(format!(
                    "expected {} scores, got {}",
                    batch.len(),
                    scores.len()
                )));
            }
            Ok(scores)
        });

        let scores: Vec<f32> = try_join_all(batches).await?.into_iter().flatten().collect();
        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(QuarryError::RerankUnavailable(format!(
                "rerank model returned a non-finite score: {bad}"
            )));
        }
        Ok(scores)
    }
}

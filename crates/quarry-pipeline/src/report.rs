use std::sync::Arc;
use std::time::Duration;

use quarry_core::{Chunk, CompressedChunk, Degradation, DegradationReason, Stage, SubQuery};
use serde::Serialize;
use uuid::Uuid;

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// Disabled by the profile, or not runnable with the configured collaborators.
    Skipped,
    /// Cut short by its time budget; partial results were kept.
    Truncated,
    /// The stage's collaborator failed and a fallback was used.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Per-request observability metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub request_id: Uuid,
    pub profile: String,
    /// States visited, in order.
    pub states: Vec<Stage>,
    pub stages: Vec<StageRecord>,
    pub degradations: Vec<Degradation>,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn new(request_id: Uuid, profile: impl Into<String>) -> Self {
        Self {
            request_id,
            profile: profile.into(),
            states: Vec::new(),
            stages: Vec::new(),
            degradations: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn status_of(&self, stage: Stage) -> Option<StageStatus> {
        self.stage(stage).map(|r| r.status)
    }

    pub fn has_reason(&self, reason: DegradationReason) -> bool {
        self.degradations.iter().any(|d| d.reason == reason)
    }
}

/// Overall outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Complete,
    /// Best-effort results; see the report's degradations.
    Degraded,
    /// Every retriever failed; the result set is empty.
    NoRetrievalPossible,
    Cancelled,
}

/// One final result.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineHit {
    /// 1-based final position.
    pub rank: usize,
    pub chunk: Arc<Chunk>,
    pub fused_score: f64,
    /// 1-based position in the fused list before reranking.
    pub fused_rank: usize,
    pub reranker_score: Option<f32>,
    /// Present when the compression stage produced output for this chunk.
    pub compressed: Option<CompressedChunk>,
}

impl PipelineHit {
    /// Text to hand to generation: the compressed text if any, else the chunk content.
    pub fn text(&self) -> &str {
        match &self.compressed {
            Some(c) => &c.text,
            None => &self.chunk.content,
        }
    }
}

/// The pipeline's answer to one query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResponse {
    pub status: ResponseStatus,
    pub hits: Vec<PipelineHit>,
    /// Retrieval queries actually issued (the literal query alone when not decomposed).
    pub subqueries: Vec<SubQuery>,
    pub report: PipelineReport,
}

impl RetrievalResponse {
    pub fn is_degraded(&self) -> bool {
        self.status != ResponseStatus::Complete
    }

    pub fn chunk_ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.chunk.id.as_str()).collect()
    }
}

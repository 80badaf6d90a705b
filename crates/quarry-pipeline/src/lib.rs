//! Profile-driven orchestration of the hybrid retrieval pipeline.
//!
//! A [`Pipeline`] takes a [`Query`], optionally decomposes it and computes
//! hypothetical-answer vectors, issues every configured retriever
//! concurrently, fuses their rankings, reranks the head of the fused list
//! and compresses the surviving chunks. Which of those stages run, and how
//! much of the latency budget each may spend, is decided by the request's
//! [`Profile`].

mod cancel;
mod observer;
mod orchestrator;
mod profile;
mod report;

pub use cancel::CancellationToken;
pub use observer::{
    CompositeObserver, PipelineEvent, PipelineObserver, RecordingObserver, TracingObserver,
};
pub use orchestrator::{Pipeline, PipelineBuilder};
pub use profile::{
    FusionConfig, Profile, ProfileConfig, ProfileRegistry, StageBudgets, DEFAULT_PROFILE,
};
pub use report::{
    PipelineHit, PipelineReport, ResponseStatus, RetrievalResponse, StageRecord, StageStatus,
};

pub use quarry_core::{Degradation, DegradationReason, Query, QuarryError, Stage};

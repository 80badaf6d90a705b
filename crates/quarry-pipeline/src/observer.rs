use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quarry_core::{Degradation, QuarryError, Stage};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{ResponseStatus, StageStatus};

/// Lifecycle events emitted while a request moves through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RequestStarted {
        request_id: Uuid,
        profile: String,
    },
    StageStarted {
        request_id: Uuid,
        stage: Stage,
    },
    StageFinished {
        request_id: Uuid,
        stage: Stage,
        status: StageStatus,
        elapsed: Duration,
    },
    Degraded {
        request_id: Uuid,
        degradation: Degradation,
    },
    RequestFinished {
        request_id: Uuid,
        status: ResponseStatus,
        results: usize,
        elapsed: Duration,
    },
}

/// Receives pipeline events. Errors are logged and never affect the request.
#[async_trait]
pub trait PipelineObserver: Send + Sync {
    async fn on_event(&self, event: PipelineEvent) -> Result<(), QuarryError>;
}

/// Logs every event through `tracing`.
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineObserver for TracingObserver {
    async fn on_event(&self, event: PipelineEvent) -> Result<(), QuarryError> {
        match event {
            PipelineEvent::RequestStarted {
                request_id,
                profile,
            } => {
                tracing::info!(request_id = %request_id, profile = %profile, "request started");
            }
            PipelineEvent::StageStarted { request_id, stage } => {
                tracing::debug!(request_id = %request_id, stage = %stage, "stage started");
            }
            PipelineEvent::StageFinished {
                request_id,
                stage,
                status,
                elapsed,
            } => {
                tracing::debug!(
                    request_id = %request_id,
                    stage = %stage,
                    status = ?status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "stage finished"
                );
            }
            PipelineEvent::Degraded {
                request_id,
                degradation,
            } => {
                tracing::warn!(
                    request_id = %request_id,
                    stage = %degradation.stage,
                    reason = ?degradation.reason,
                    detail = %degradation.detail,
                    "pipeline degraded"
                );
            }
            PipelineEvent::RequestFinished {
                request_id,
                status,
                results,
                elapsed,
            } => {
                tracing::info!(
                    request_id = %request_id,
                    status = ?status,
                    results,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "request finished"
                );
            }
        }
        Ok(())
    }
}

/// Stores every event it sees.
#[derive(Default, Clone)]
pub struct RecordingObserver {
    events: Arc<RwLock<Vec<PipelineEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl PipelineObserver for RecordingObserver {
    async fn on_event(&self, event: PipelineEvent) -> Result<(), QuarryError> {
        self.events.write().await.push(event);
        Ok(())
    }
}

/// Forwards each event to several observers in order.
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

#[async_trait]
impl PipelineObserver for CompositeObserver {
    async fn on_event(&self, event: PipelineEvent) -> Result<(), QuarryError> {
        for observer in &self.observers {
            observer.on_event(event.clone()).await?;
        }
        Ok(())
    }
}

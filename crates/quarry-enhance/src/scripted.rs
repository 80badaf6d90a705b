use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::{Generation, GenerationRequest, Generator, QuarryError};
use tokio::sync::Mutex;

/// A generator that replays queued responses in order and records every prompt.
///
/// Once the queue is exhausted it answers with the repeat response if one is
/// set, and with an error otherwise.
#[derive(Clone)]
pub struct ScriptedGenerator {
    responses: Arc<Mutex<VecDeque<Result<Generation, QuarryError>>>>,
    repeat: Option<Generation>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Generation>) -> Self {
        Self::from_results(responses.into_iter().map(Ok).collect())
    }

    /// Queue successes and failures.
    pub fn from_results(responses: Vec<Result<Generation, QuarryError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            repeat: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A generator that always answers with `generation`.
    pub fn always(generation: Generation) -> Self {
        Self::new(Vec::new()).with_repeat(generation)
    }

    pub fn with_repeat(mut self, generation: Generation) -> Self {
        self.repeat = Some(generation);
        self
    }

    /// Prompts received so far, in call order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    pub async fn calls(&self) -> usize {
        self.prompts.lock().await.len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, QuarryError> {
        self.prompts.lock().await.push(request.prompt);
        let mut responses = self.responses.lock().await;
        match responses.pop_front() {
            Some(response) => response,
            None => self.repeat.clone().ok_or_else(|| {
                QuarryError::Generation("scripted generator exhausted responses".to_string())
            }),
        }
    }
}

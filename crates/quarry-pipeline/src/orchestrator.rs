use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use quarry_compress::{CompressionConfig, ContextualCompressor};
use quarry_core::{
    CompressedChunk, Degradation, DegradationReason, Embeddings, Filters, FusedResult, Generator,
    Outcome, QuarryError, Query, RankedList, RerankModel, RerankedResult, RetrievalRequest,
    Retriever, Stage, SubQuery,
};
use quarry_enhance::{decompose_query, Decomposer, HeuristicDecomposer, HydeRewriter};
use quarry_rerank::{Reranker, DEFAULT_RERANK_BATCH_SIZE};
use quarry_retrieval::{FusionMode, FusionWeights, RankFusion};
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    CancellationToken, PipelineEvent, PipelineHit, PipelineObserver, PipelineReport, Profile,
    ProfileRegistry, ResponseStatus, RetrievalResponse, StageRecord, StageStatus, TracingObserver,
};

/// Race `fut` against request cancellation. `None` means cancelled; `fut` is dropped.
async fn cancellable<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

/// A retrieval query after enhancement: the text for lexical retrievers and,
/// when enhancement produced one, the vector for dense retrievers.
struct PlannedQuery {
    sub: SubQuery,
    vector: Option<Vec<f32>>,
}

/// What one sub-query's retriever fan-out produced.
struct SubqueryRetrieval {
    lists: Vec<RankedList>,
    succeeded: usize,
    timed_out: bool,
    degradations: Vec<Degradation>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`Pipeline`] from explicitly provided collaborators.
#[derive(Default)]
pub struct PipelineBuilder {
    embeddings: Option<Arc<dyn Embeddings>>,
    retrievers: Vec<Arc<dyn Retriever>>,
    generator: Option<Arc<dyn Generator>>,
    decomposer: Option<Arc<dyn Decomposer>>,
    rerank_model: Option<Arc<dyn RerankModel>>,
    rerank_batch_size: Option<usize>,
    compression: Option<CompressionConfig>,
    profiles: Option<ProfileRegistry>,
    observer: Option<Arc<dyn PipelineObserver>>,
}

impl PipelineBuilder {
    /// Embedding model used for query vectors and sentence scoring. Required.
    pub fn embeddings(mut self, embeddings: Arc<dyn Embeddings>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Add a retriever. Its name identifies its list during fusion and must be unique.
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retrievers.push(retriever);
        self
    }

    /// Generation model enabling HyDE rewriting.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Decomposer for multi-part queries (defaults to [`HeuristicDecomposer`]).
    pub fn decomposer(mut self, decomposer: Arc<dyn Decomposer>) -> Self {
        self.decomposer = Some(decomposer);
        self
    }

    pub fn rerank_model(mut self, model: Arc<dyn RerankModel>) -> Self {
        self.rerank_model = Some(model);
        self
    }

    pub fn rerank_batch_size(mut self, batch_size: usize) -> Self {
        self.rerank_batch_size = Some(batch_size);
        self
    }

    /// Base compression settings; each profile overrides the target ratio.
    pub fn compression(mut self, config: CompressionConfig) -> Self {
        self.compression = Some(config);
        self
    }

    pub fn profiles(mut self, profiles: ProfileRegistry) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<Pipeline, QuarryError> {
        let embeddings = self.embeddings.ok_or_else(|| {
            QuarryError::Config("pipeline requires an embedding model".to_string())
        })?;

        if self.retrievers.is_empty() {
            return Err(QuarryError::Config(
                "pipeline requires at least one retriever".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for retriever in &self.retrievers {
            if !names.insert(retriever.name()) {
                return Err(QuarryError::Config(format!(
                    "duplicate retriever name '{}'",
                    retriever.name()
                )));
            }
        }

        let profiles = self.profiles.unwrap_or_default();
        for profile in profiles.profiles() {
            check_weighted_sources(profile, &self.retrievers)?;
        }

        let compression = self.compression.unwrap_or_default();
        compression.validate()?;

        let hyde = self
            .generator
            .map(|generator| HydeRewriter::new(generator, embeddings.clone()));

        Ok(Pipeline {
            embeddings,
            retrievers: self.retrievers,
            decomposer: self
                .decomposer
                .unwrap_or_else(|| Arc::new(HeuristicDecomposer::new())),
            hyde,
            rerank_model: self.rerank_model,
            rerank_batch_size: self
                .rerank_batch_size
                .unwrap_or(DEFAULT_RERANK_BATCH_SIZE)
                .max(1),
            compression,
            profiles,
            observer: self
                .observer
                .unwrap_or_else(|| Arc::new(TracingObserver::new())),
        })
    }
}

// ---------------------------------------------------------------------------
// Per-request bookkeeping
// ---------------------------------------------------------------------------

struct RequestRun<'a> {
    observer: &'a dyn PipelineObserver,
    report: PipelineReport,
    started: Instant,
}

impl<'a> RequestRun<'a> {
    fn new(observer: &'a dyn PipelineObserver, request_id: Uuid, profile: &str) -> Self {
        Self {
            observer,
            report: PipelineReport::new(request_id, profile),
            started: Instant::now(),
        }
    }

    fn request_id(&self) -> Uuid {
        self.report.request_id
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Err(e) = self.observer.on_event(event).await {
            tracing::warn!(error = %e, "pipeline observer failed");
        }
    }

    async fn enter(&mut self, stage: Stage) -> Instant {
        self.report.states.push(stage);
        self.emit(PipelineEvent::StageStarted {
            request_id: self.request_id(),
            stage,
        })
        .await;
        Instant::now()
    }

    async fn finish(
        &mut self,
        stage: Stage,
        status: StageStatus,
        since: Instant,
        detail: Option<String>,
    ) {
        let elapsed = since.elapsed();
        self.report.stages.push(StageRecord {
            stage,
            status,
            elapsed,
            detail,
        });
        self.emit(PipelineEvent::StageFinished {
            request_id: self.request_id(),
            stage,
            status,
            elapsed,
        })
        .await;
    }

    fn skip(&mut self, stage: Stage, detail: &str) {
        self.report.stages.push(StageRecord {
            stage,
            status: StageStatus::Skipped,
            elapsed: std::time::Duration::ZERO,
            detail: Some(detail.to_string()),
        });
    }

    async fn degrade(&mut self, degradations: impl IntoIterator<Item = Degradation>) {
        for degradation in degradations {
            self.emit(PipelineEvent::Degraded {
                request_id: self.request_id(),
                degradation: degradation.clone(),
            })
            .await;
            self.report.degradations.push(degradation);
        }
    }

    async fn complete(
        mut self,
        status: Option<ResponseStatus>,
        hits: Vec<PipelineHit>,
        subqueries: Vec<SubQuery>,
    ) -> RetrievalResponse {
        self.report.states.push(Stage::Done);
        self.report.elapsed = self.started.elapsed();
        let status = status.unwrap_or(if self.report.degradations.is_empty() {
            ResponseStatus::Complete
        } else {
            ResponseStatus::Degraded
        });
        self.emit(PipelineEvent::RequestFinished {
            request_id: self.request_id(),
            status,
            results: hits.len(),
            elapsed: self.report.elapsed,
        })
        .await;
        RetrievalResponse {
            status,
            hits,
            subqueries,
            report: self.report,
        }
    }

    async fn cancelled(
        mut self,
        stage: Stage,
        since: Instant,
        subqueries: Vec<SubQuery>,
    ) -> RetrievalResponse {
        tracing::info!(request_id = %self.request_id(), stage = %stage, "request cancelled");
        self.finish(stage, StageStatus::Failed, since, Some("cancelled".to_string()))
            .await;
        self.complete(Some(ResponseStatus::Cancelled), Vec::new(), subqueries)
            .await
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The hybrid retrieval pipeline.
///
/// One request moves through
/// `Received → (Enhancing) → Retrieving → Fusing → (Reranking) → (Compressing) → Done`,
/// with the parenthesized stages selected by the request's [`Profile`]. Each
/// collaborator call runs under its stage's time budget and the request's
/// [`CancellationToken`]. Collaborator failures and timeouts degrade the
/// response instead of failing it; they are listed in the response report.
pub struct Pipeline {
    embeddings: Arc<dyn Embeddings>,
    retrievers: Vec<Arc<dyn Retriever>>,
    decomposer: Arc<dyn Decomposer>,
    hyde: Option<HydeRewriter>,
    rerank_model: Option<Arc<dyn RerankModel>>,
    rerank_batch_size: usize,
    compression: CompressionConfig,
    profiles: ProfileRegistry,
    observer: Arc<dyn PipelineObserver>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    /// Run `query` under the profile it names (or the default profile).
    ///
    /// Fails only if the profile is unknown; every runtime failure is
    /// reported through the response status and report instead.
    pub async fn run(&self, query: &Query) -> Result<RetrievalResponse, QuarryError> {
        self.run_with_cancel(query, &CancellationToken::new()).await
    }

    pub async fn run_with_cancel(
        &self,
        query: &Query,
        token: &CancellationToken,
    ) -> Result<RetrievalResponse, QuarryError> {
        let profile = self.profiles.resolve(query.profile.as_deref())?;
        self.run_with_profile(query, profile, token).await
    }

    /// Run `query` under an explicit profile, ignoring the query's profile name.
    ///
    /// Fails with [`QuarryError::Config`] if the profile's fusion weights name
    /// a retriever this pipeline does not have.
    pub async fn run_with_profile(
        &self,
        query: &Query,
        profile: &Profile,
        token: &CancellationToken,
    ) -> Result<RetrievalResponse, QuarryError> {
        check_weighted_sources(profile, &self.retrievers)?;
        let span = tracing::info_span!(
            "quarry.request",
            request_id = %query.id,
            profile = %profile.name()
        );
        Ok(self.execute(query, profile, token).instrument(span).await)
    }

    async fn execute(
        &self,
        query: &Query,
        profile: &Profile,
        token: &CancellationToken,
    ) -> RetrievalResponse {
        let mut run = RequestRun::new(self.observer.as_ref(), query.id, profile.name());
        run.emit(PipelineEvent::RequestStarted {
            request_id: query.id,
            profile: profile.name().to_string(),
        })
        .await;
        run.report.states.push(Stage::Received);
        let budgets = profile.budgets();

        // Enhancing
        let literal = || vec![SubQuery::new(query, 0, query.text.as_str())];
        let plans = if profile.decompose() || profile.hyde() {
            let since = run.enter(Stage::Enhancing).await;
            let deadline = Instant::now() + budgets.enhance;
            let mut status = StageStatus::Completed;

            let subqueries = if profile.decompose() {
                let decomposed = decompose_query(
                    self.decomposer.as_ref(),
                    query,
                    profile.max_subqueries(),
                );
                match cancellable(token, timeout_at(deadline, decomposed)).await {
                    None => return run.cancelled(Stage::Enhancing, since, literal()).await,
                    Some(Err(_)) => {
                        status = StageStatus::Truncated;
                        run.degrade([Degradation::new(
                            Stage::Enhancing,
                            DegradationReason::TimeoutExceeded,
                            "decomposition exceeded its budget, using the literal query",
                        )])
                        .await;
                        literal()
                    }
                    Some(Ok(outcome)) => {
                        let (subqueries, degradations) = outcome.into_parts();
                        if !degradations.is_empty() {
                            status = StageStatus::Failed;
                        }
                        run.degrade(degradations).await;
                        subqueries
                    }
                }
            } else {
                literal()
            };

            let vectors = if profile.hyde() {
                let rewrites = self.hypothetical_vectors(&subqueries, profile);
                let rewritten = cancellable(token, timeout_at(deadline, rewrites)).await;
                match rewritten {
                    None => return run.cancelled(Stage::Enhancing, since, subqueries).await,
                    Some(Err(_)) => {
                        // keep the sub-queries; retrieval embeds them literally
                        status = StageStatus::Truncated;
                        run.degrade([Degradation::new(
                            Stage::Enhancing,
                            DegradationReason::TimeoutExceeded,
                            "hypothetical answers exceeded the enhancement budget",
                        )])
                        .await;
                        vec![None; subqueries.len()]
                    }
                    Some(Ok(outcome)) => {
                        let (vectors, degradations) = outcome.into_parts();
                        let failed = degradations
                            .iter()
                            .any(|d| d.reason == DegradationReason::EnhancementFailed);
                        if failed && status == StageStatus::Completed {
                            status = StageStatus::Failed;
                        }
                        run.degrade(degradations).await;
                        vectors
                    }
                }
            } else {
                vec![None; subqueries.len()]
            };

            run.finish(Stage::Enhancing, status, since, None).await;
            subqueries
                .into_iter()
                .zip(vectors)
                .map(|(sub, vector)| PlannedQuery { sub, vector })
                .collect()
        } else {
            run.skip(Stage::Enhancing, "disabled by profile");
            literal()
                .into_iter()
                .map(|sub| PlannedQuery { sub, vector: None })
                .collect::<Vec<_>>()
        };
        let subqueries: Vec<SubQuery> = plans.iter().map(|p| p.sub.clone()).collect();

        // Retrieving
        let since = run.enter(Stage::Retrieving).await;
        let deadline = Instant::now() + budgets.retrieve;
        let fan_out = join_all(plans.iter().map(|plan| {
            self.retrieve_one(plan, &query.filters, profile.retrieval_k(), deadline)
        }));
        let retrieved = match cancellable(token, fan_out).await {
            Some(retrieved) => retrieved,
            None => return run.cancelled(Stage::Retrieving, since, subqueries).await,
        };
        let succeeded: usize = retrieved.iter().map(|r| r.succeeded).sum();
        let timed_out = retrieved.iter().any(|r| r.timed_out);
        let mut lists_per_subquery = Vec::with_capacity(retrieved.len());
        for r in retrieved {
            run.degrade(r.degradations).await;
            lists_per_subquery.push(r.lists);
        }
        if succeeded == 0 {
            tracing::warn!(request_id = %query.id, "no retriever produced results");
            run.finish(Stage::Retrieving, StageStatus::Failed, since, None).await;
            return run
                .complete(Some(ResponseStatus::NoRetrievalPossible), Vec::new(), subqueries)
                .await;
        }
        let status = if timed_out {
            StageStatus::Truncated
        } else {
            StageStatus::Completed
        };
        run.finish(Stage::Retrieving, status, since, None).await;

        // Fusing
        let since = run.enter(Stage::Fusing).await;
        let fused = fuse_subqueries(profile, &subqueries, &lists_per_subquery);
        tracing::debug!(request_id = %query.id, candidates = fused.len(), "fusion complete");
        run.finish(Stage::Fusing, StageStatus::Completed, since, None).await;

        // Reranking
        let mut ranked = if profile.rerank() {
            let since = run.enter(Stage::Reranking).await;
            match &self.rerank_model {
                None => {
                    run.degrade([Degradation::new(
                        Stage::Reranking,
                        DegradationReason::RerankUnavailable,
                        "no rerank model configured",
                    )])
                    .await;
                    run.finish(Stage::Reranking, StageStatus::Failed, since, None).await;
                    RerankedResult::passthrough(&fused)
                }
                Some(model) => {
                    let reranker = Reranker::new(model.clone())
                        .with_top_n(profile.rerank_top_n())
                        .with_batch_size(self.rerank_batch_size);
                    let deadline = Instant::now() + budgets.rerank;
                    let reranking = reranker.rerank(&query.text, &fused);
                    match cancellable(token, timeout_at(deadline, reranking)).await {
                        None => return run.cancelled(Stage::Reranking, since, subqueries).await,
                        Some(Err(_)) => {
                            run.degrade([Degradation::new(
                                Stage::Reranking,
                                DegradationReason::TimeoutExceeded,
                                "reranking exceeded its budget, keeping fused order",
                            )])
                            .await;
                            run.finish(Stage::Reranking, StageStatus::Truncated, since, None).await;
                            RerankedResult::passthrough(&fused)
                        }
                        Some(Ok(outcome)) => {
                            let (reranked, degradations) = outcome.into_parts();
                            let status = if degradations.is_empty() {
                                StageStatus::Completed
                            } else {
                                StageStatus::Failed
                            };
                            run.degrade(degradations).await;
                            run.finish(Stage::Reranking, status, since, None).await;
                            reranked
                        }
                    }
                }
            }
        } else {
            run.skip(Stage::Reranking, "disabled by profile");
            RerankedResult::passthrough(&fused)
        };
        ranked.truncate(profile.top_k());

        // Compressing
        let mut compressed: Vec<Option<CompressedChunk>> = vec![None; ranked.len()];
        if !profile.compress() {
            run.skip(Stage::Compressing, "disabled by profile");
        } else if ranked.is_empty() {
            run.skip(Stage::Compressing, "no candidates");
        } else {
            let since = run.enter(Stage::Compressing).await;
            let deadline = Instant::now() + budgets.compress;
            let compressor = ContextualCompressor::new(self.embeddings.clone()).with_config(
                self.compression
                    .clone()
                    .with_target_ratio(profile.compression_ratio()),
            );

            let embedding = self.embeddings.embed_query(&query.text);
            let vector = match cancellable(token, timeout_at(deadline, embedding)).await {
                None => return run.cancelled(Stage::Compressing, since, subqueries).await,
                Some(Ok(Ok(vector))) => Some(vector),
                Some(Ok(Err(e))) => {
                    run.degrade([Degradation::new(
                        Stage::Compressing,
                        DegradationReason::CompressionUnavailable,
                        format!("query embedding failed, chunks left uncompressed: {e}"),
                    )])
                    .await;
                    None
                }
                Some(Err(_)) => {
                    run.degrade([Degradation::new(
                        Stage::Compressing,
                        DegradationReason::TimeoutExceeded,
                        "compression budget spent embedding the query",
                    )])
                    .await;
                    None
                }
            };

            let status = match vector {
                None => StageStatus::Failed,
                Some(vector) => {
                    let mut pending: FuturesUnordered<_> = ranked
                        .iter()
                        .enumerate()
                        .map(|(idx, hit)| {
                            let compressor = &compressor;
                            let vector = vector.as_slice();
                            let chunk = hit.chunk.clone();
                            async move {
                                (idx, compressor.compress_with_vector(vector, chunk).await)
                            }
                        })
                        .collect();

                    let mut finished = 0;
                    let mut truncated = false;
                    loop {
                        match cancellable(token, timeout_at(deadline, pending.next())).await {
                            None => {
                                drop(pending);
                                return run.cancelled(Stage::Compressing, since, subqueries).await;
                            }
                            Some(Ok(Some((idx, outcome)))) => {
                                let (value, degradations) = outcome.into_parts();
                                run.degrade(degradations).await;
                                compressed[idx] = Some(value);
                                finished += 1;
                            }
                            Some(Ok(None)) => break,
                            Some(Err(_)) => {
                                truncated = true;
                                break;
                            }
                        }
                    }

                    if truncated {
                        run.degrade([Degradation::new(
                            Stage::Compressing,
                            DegradationReason::TimeoutExceeded,
                            format!(
                                "compressed {finished} of {} chunks before the deadline",
                                ranked.len()
                            ),
                        )])
                        .await;
                        StageStatus::Truncated
                    } else {
                        StageStatus::Completed
                    }
                }
            };
            run.finish(Stage::Compressing, status, since, None).await;
        }

        let hits = ranked
            .into_iter()
            .zip(compressed)
            .enumerate()
            .map(|(idx, (hit, compressed))| PipelineHit {
                rank: idx + 1,
                chunk: hit.chunk,
                fused_score: hit.fused_score,
                fused_rank: hit.fused_rank,
                reranker_score: hit.reranker_score,
                compressed,
            })
            .collect();
        run.complete(None, hits, subqueries).await
    }

    /// HyDE query vectors, one per sub-query. A `None` entry is embedded
    /// literally at retrieval time.
    async fn hypothetical_vectors(
        &self,
        subqueries: &[SubQuery],
        profile: &Profile,
    ) -> Outcome<Vec<Option<Vec<f32>>>> {
        let Some(hyde) = &self.hyde else {
            return Outcome::degraded(
                vec![None; subqueries.len()],
                Degradation::new(
                    Stage::Enhancing,
                    DegradationReason::EnhancementFailed,
                    "no generation model configured for hypothetical answers",
                ),
            );
        };

        let rewrites = join_all(
            subqueries
                .iter()
                .map(|sq| hyde.rewrite_with_threshold(&sq.text, profile.hyde_threshold())),
        )
        .await;

        let mut degradations = Vec::new();
        let vectors = rewrites
            .into_iter()
            .map(|rewrite| match rewrite {
                Ok(outcome) => {
                    let (query_vector, d) = outcome.into_parts();
                    degradations.extend(d);
                    Some(query_vector.vector)
                }
                Err(e) => {
                    degradations.push(Degradation::new(
                        Stage::Enhancing,
                        DegradationReason::EnhancementFailed,
                        format!("query embedding failed: {e}"),
                    ));
                    None
                }
            })
            .collect();
        Outcome {
            value: vectors,
            degradations,
        }
    }

    /// Issue every retriever concurrently for one sub-query and collect their lists.
    ///
    /// A retriever that fails contributes no list; one that misses the
    /// deadline contributes an empty list.
    async fn retrieve_one(
        &self,
        plan: &PlannedQuery,
        filters: &Filters,
        k: usize,
        deadline: Instant,
    ) -> SubqueryRetrieval {
        let vector = match &plan.vector {
            Some(vector) => Some(vector.clone()),
            None => match timeout_at(deadline, self.embeddings.embed_query(&plan.sub.text)).await {
                Ok(Ok(vector)) => Some(vector),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, subquery = plan.sub.index, "query embedding failed");
                    None
                }
                Err(_) => None,
            },
        };

        let request = RetrievalRequest {
            text: &plan.sub.text,
            vector: vector.as_deref(),
            k,
            filters,
        };
        let results = join_all(self.retrievers.iter().map(|retriever| async move {
            let outcome = timeout_at(deadline, retriever.retrieve(&request)).await;
            (retriever.name(), outcome)
        }))
        .await;

        let mut retrieval = SubqueryRetrieval {
            lists: Vec::with_capacity(results.len()),
            succeeded: 0,
            timed_out: false,
            degradations: Vec::new(),
        };
        for (name, outcome) in results {
            match outcome {
                Ok(Ok(hits)) => {
                    tracing::debug!(
                        retriever = name,
                        subquery = plan.sub.index,
                        hits = hits.len(),
                        "retriever finished"
                    );
                    retrieval.succeeded += 1;
                    retrieval.lists.push(RankedList::new(name, hits));
                }
                Ok(Err(e)) => {
                    retrieval.degradations.push(Degradation::new(
                        Stage::Retrieving,
                        DegradationReason::RetrievalUnavailable,
                        format!("{name} retriever failed for sub-query {}: {e}", plan.sub.index),
                    ));
                }
                Err(_) => {
                    retrieval.timed_out = true;
                    retrieval.degradations.push(Degradation::new(
                        Stage::Retrieving,
                        DegradationReason::TimeoutExceeded,
                        format!(
                            "{name} retriever exceeded the retrieval budget for sub-query {}",
                            plan.sub.index
                        ),
                    ));
                    retrieval.lists.push(RankedList::new(name, Vec::new()));
                }
            }
        }
        retrieval
    }
}

/// Reject a weighted profile whose weights name a retriever the pipeline lacks.
fn check_weighted_sources(
    profile: &Profile,
    retrievers: &[Arc<dyn Retriever>],
) -> Result<(), QuarryError> {
    match profile
        .weighted_sources()
        .into_iter()
        .find(|source| !retrievers.iter().any(|r| r.name() == *source))
    {
        Some(unknown) => Err(QuarryError::Config(format!(
            "profile '{}' weights unknown retriever '{unknown}'",
            profile.name()
        ))),
        None => Ok(()),
    }
}

/// Fuse each sub-query's lists, then merge sub-queries with a secondary pass.
fn fuse_subqueries(
    profile: &Profile,
    subqueries: &[SubQuery],
    lists_per_subquery: &[Vec<RankedList>],
) -> Vec<FusedResult> {
    let mut per_subquery: Vec<Vec<FusedResult>> = lists_per_subquery
        .iter()
        .map(|lists| profile.fusion().fuse(lists))
        .collect();
    if per_subquery.len() == 1 {
        return per_subquery.pop().unwrap_or_default();
    }

    let sources: Vec<String> = subqueries.iter().map(SubQuery::source_name).collect();
    let secondary = match profile.fusion().mode() {
        FusionMode::Rrf { k } => RankFusion::with_rrf_k(*k),
        FusionMode::Weighted(_) => match FusionWeights::uniform(sources.iter().cloned()) {
            Ok(weights) => RankFusion::weighted(weights),
            Err(_) => RankFusion::rrf(),
        },
    };
    let lists: Vec<RankedList> = sources
        .into_iter()
        .zip(&per_subquery)
        .map(|(source, fused)| RankedList::from_fused(source, fused))
        .collect();
    secondary.fuse(&lists)
}

//! Quarry: hybrid retrieval with query enhancement, rank fusion, reranking
//! and contextual compression.
//!
//! This crate re-exports the Quarry sub-crates for single-import usage.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `pipeline` + `embeddings` |
//! | `embeddings` | Embedding cache, cache-backed wrapper, deterministic fake model |
//! | `retrieval` | BM25 keyword index, dense retriever, in-memory corpus, rank fusion |
//! | `enhance` | Query decomposition and HyDE rewriting |
//! | `rerank` | Batched reranking with a lexical model |
//! | `compress` | Sentence-level contextual compression |
//! | `pipeline` | Profile-driven orchestrator (pulls in every stage) |
//! | `full` | All features enabled |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quarry::core::Query;
//! use quarry::embeddings::FakeEmbeddings;
//! use quarry::pipeline::Pipeline;
//! use quarry::retrieval::{DenseRetriever, InMemoryCorpus, KeywordIndex};
//!
//! let pipeline = Pipeline::builder()
//!     .embeddings(Arc::new(FakeEmbeddings::default()))
//!     .retriever(Arc::new(DenseRetriever::new(corpus.clone(), corpus.clone())))
//!     .retriever(Arc::new(keyword_index))
//!     .build()?;
//! let response = pipeline.run(&Query::new("how does attention work?")).await?;
//! ```

/// Core types and collaborator traits: Chunk, Query, Embeddings, Retriever, QuarryError, etc.
/// Always available.
pub use quarry_core as core;

/// Embedding cache and embedding model wrappers.
#[cfg(feature = "embeddings")]
pub use quarry_embeddings as embeddings;

/// Keyword and dense retrievers, the in-memory corpus, rank fusion.
#[cfg(feature = "retrieval")]
pub use quarry_retrieval as retrieval;

/// Query decomposition and hypothetical-document rewriting.
#[cfg(feature = "enhance")]
pub use quarry_enhance as enhance;

/// Second-pass reranking.
#[cfg(feature = "rerank")]
pub use quarry_rerank as rerank;

/// Contextual compression.
#[cfg(feature = "compress")]
pub use quarry_compress as compress;

/// Pipeline orchestration, profiles, observers.
#[cfg(feature = "pipeline")]
pub use quarry_pipeline as pipeline;

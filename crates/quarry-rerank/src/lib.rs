//! Second-pass relevance scoring over the head of a fused ranking.
//!
//! [`Reranker`] scores only the configured top-N candidates, in batches, and
//! appends everything beyond N in fused order. If the rerank model fails the
//! fused order passes through unchanged.

mod lexical;
mod reranker;

pub use lexical::{LexicalRerankConfig, LexicalRerankModel};
pub use reranker::{Reranker, DEFAULT_RERANK_BATCH_SIZE, DEFAULT_RERANK_TOP_N};

pub use quarry_core::RerankModel;

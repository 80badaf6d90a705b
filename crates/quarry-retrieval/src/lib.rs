mod dense;
mod fusion;
mod keyword;
mod memory;
mod tokenize;

pub use dense::DenseRetriever;
pub use fusion::{FusionMode, FusionWeights, RankFusion, DEFAULT_RRF_K};
pub use keyword::{Bm25Params, KeywordIndex};
pub use memory::InMemoryCorpus;
pub use tokenize::Tokenizer;

// Re-export the retrieval types from core for convenience
pub use quarry_core::{RankedList, RetrievalRequest, RetrievalResult, Retriever};

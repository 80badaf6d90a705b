mod cache;
mod cached;
mod fake;

pub use cache::{normalize_text, CachePut, EmbeddingCache};
pub use cached::CacheBackedEmbeddings;
pub use fake::FakeEmbeddings;

// Re-export the Embeddings trait from core (forward-declared there).
pub use quarry_core::Embeddings;

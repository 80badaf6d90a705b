mod compressor;
mod sentence;

pub use compressor::{CompressionConfig, ContextualCompressor};
pub use sentence::split_sentences;

pub use quarry_core::{CompressedChunk, SentenceSpan};

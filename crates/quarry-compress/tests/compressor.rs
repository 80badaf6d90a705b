use std::sync::Arc;

use async_trait::async_trait;
use quarry_compress::{CompressionConfig, ContextualCompressor};
use quarry_core::{Chunk, DegradationReason, Embeddings, QuarryError};
use quarry_embeddings::FakeEmbeddings;

const CONTENT: &str = "Sourdough needs a long fermentation. \
    The starter is fed with flour and water every day. \
    Transformers rely on self attention to relate tokens. \
    Attention weights come from a softmax over scaled dot products. \
    Bakers often score the loaf before it goes into the oven. \
    A hot oven gives the crust its colour.";

fn chunk(content: &str) -> Arc<Chunk> {
    Arc::new(Chunk::new("c1", "d1", 0, content))
}

fn compressor(config: CompressionConfig) -> ContextualCompressor {
    ContextualCompressor::new(Arc::new(FakeEmbeddings::new(256))).with_config(config)
}

#[tokio::test]
async fn keeps_relevant_sentences_with_window() {
    let config = CompressionConfig::default()
        .with_target_ratio(0.4)
        .with_window(1)
        .with_length_bounds(20, 2000);
    let outcome = compressor(config)
        .compress("how does attention relate tokens in transformers", chunk(CONTENT))
        .await;

    assert!(!outcome.is_degraded());
    let compressed = outcome.value;
    assert!(compressed.text.contains("Transformers rely on self attention"));
    assert!(!compressed.text.contains("crust"));
    assert!(compressed.ratio < 1.0);
    assert!(compressed.ratio > 0.0);
}

#[tokio::test]
async fn output_preserves_document_order() {
    let config = CompressionConfig::default()
        .with_target_ratio(0.7)
        .with_window(0)
        .with_length_bounds(20, 2000);
    let compressed = compressor(config)
        .compress("oven attention", chunk(CONTENT))
        .await
        .value;

    let starts: Vec<usize> = compressed.spans.iter().map(|s| s.start).collect();
    let mut sorted = starts.clone();
    sorted.sort();
    assert_eq!(starts, sorted);
    for span in &compressed.spans {
        assert!(compressed.text.contains(&CONTENT[span.start..span.end]));
    }
}

#[tokio::test]
async fn strict_threshold_never_returns_empty() {
    let config = CompressionConfig::default()
        .with_min_relevance(1.1)
        .with_length_bounds(20, 2000);
    let outcome = compressor(config)
        .compress("completely unrelated query words", chunk(CONTENT))
        .await;

    assert!(outcome.has_reason(DegradationReason::CompressionDegenerate));
    let compressed = outcome.value;
    assert!(!compressed.text.is_empty());
    assert!(CONTENT.starts_with(&compressed.text));
}

#[tokio::test]
async fn short_chunks_are_returned_whole() {
    let outcome = compressor(CompressionConfig::default())
        .compress("anything", chunk("Short. Text."))
        .await;

    assert!(!outcome.is_degraded());
    assert_eq!(outcome.value.text, "Short. Text.");
    assert_eq!(outcome.value.ratio, 1.0);
}

#[tokio::test]
async fn single_sentence_chunk_is_returned_whole() {
    let text = "one long sentence without any terminal punctuation that goes on and on and on \
                for well over the minimum length threshold configured by default";
    let outcome = compressor(CompressionConfig::default())
        .compress("query", chunk(text))
        .await;

    assert!(!outcome.is_degraded());
    assert_eq!(outcome.value.text, text);
}

#[tokio::test]
async fn output_respects_max_length() {
    let config = CompressionConfig::default()
        .with_target_ratio(1.0)
        .with_length_bounds(10, 60);
    let compressed = compressor(config)
        .compress("attention", chunk(CONTENT))
        .await
        .value;

    assert!(!compressed.text.is_empty());
    assert!(compressed.text.len() <= 60);
}

struct BrokenEmbeddings;

#[async_trait]
impl Embeddings for BrokenEmbeddings {
    fn model_id(&self) -> &str {
        "broken"
    }

    async fn embed_documents(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, QuarryError> {
        Err(QuarryError::Embedding("unreachable".to_string()))
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, QuarryError> {
        Ok(vec![1.0, 0.0])
    }
}

#[tokio::test]
async fn embedding_failure_falls_back_to_truncated_original() {
    let compressor = ContextualCompressor::new(Arc::new(BrokenEmbeddings)).with_config(
        CompressionConfig::default()
            .with_target_ratio(0.5)
            .with_length_bounds(20, 2000),
    );
    let outcome = compressor.compress("attention", chunk(CONTENT)).await;

    assert!(outcome.has_reason(DegradationReason::CompressionUnavailable));
    assert!(!outcome.has_reason(DegradationReason::CompressionDegenerate));
    assert!(!outcome.value.text.is_empty());
    assert!(outcome.value.text.len() <= CONTENT.len() / 2 + 1);
}

#[tokio::test]
async fn compress_all_keeps_input_order() {
    let chunks = vec![
        Arc::new(Chunk::new("a", "d", 0, CONTENT)),
        Arc::new(Chunk::new("b", "d", 1, "Tiny.")),
        Arc::new(Chunk::new("c", "d", 2, CONTENT)),
    ];
    let config = CompressionConfig::default().with_length_bounds(20, 2000);
    let outcome = compressor(config).compress_all("attention", chunks).await;

    let ids: Vec<&str> = outcome.value.iter().map(|c| c.chunk.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(outcome.value.iter().all(|c| !c.text.is_empty()));
}

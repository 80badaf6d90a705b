use quarry_core::cosine_similarity;
use quarry_embeddings::{Embeddings, FakeEmbeddings};

#[tokio::test]
async fn fake_embeddings_are_deterministic() {
    let embeddings = FakeEmbeddings::new(16);
    let a = embeddings.embed_query("rust ownership").await.unwrap();
    let b = embeddings.embed_query("rust ownership").await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 16);
}

#[tokio::test]
async fn shared_vocabulary_is_more_similar() {
    let embeddings = FakeEmbeddings::default();
    let query = embeddings.embed_query("attention in transformers").await.unwrap();
    let related = embeddings
        .embed_query("transformers rely on attention layers")
        .await
        .unwrap();
    let unrelated = embeddings
        .embed_query("cooking pasta with garlic")
        .await
        .unwrap();

    assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
}

#[tokio::test]
async fn empty_text_yields_zero_vector() {
    let embeddings = FakeEmbeddings::new(4);
    let vector = embeddings.embed_query("").await.unwrap();
    assert_eq!(vector, vec![0.0; 4]);
}

#[test]
fn model_id_includes_dimensions() {
    assert_eq!(FakeEmbeddings::new(32).model_id(), "fake-embeddings-32");
}

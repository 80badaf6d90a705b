use async_trait::async_trait;
use quarry_core::QuarryError;

use crate::Embeddings;

/// Deterministic embeddings for testing.
///
/// Each lowercase word is hashed into one of `dimensions` buckets, so texts
/// sharing vocabulary produce similar vectors.
pub struct FakeEmbeddings {
    dimensions: usize,
    model_id: String,
}

impl FakeEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("fake-embeddings-{dimensions}"),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

impl Default for FakeEmbeddings {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embeddings for FakeEmbeddings {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, QuarryError> {
        Ok(texts
            .iter()
            .map(|t| text_to_vector(t, self.dimensions))
            .collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, QuarryError> {
        Ok(text_to_vector(text, self.dimensions))
    }
}

/// Hashed bag-of-words vector, normalized to unit length.
fn text_to_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimensions];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = fnv1a(&word.to_lowercase()) as usize % dimensions;
        vec[bucket] += 1.0;
    }

    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in &mut vec {
            *x /= magnitude;
        }
    }
    vec
}

fn fnv1a(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

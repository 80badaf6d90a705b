use std::sync::Arc;

use quarry_embeddings::{CachePut, EmbeddingCache};

#[test]
fn put_then_get_returns_vector() {
    let cache = EmbeddingCache::new();
    assert_eq!(cache.put("hello", "m", vec![1.0, 2.0]), CachePut::Inserted);
    assert_eq!(cache.get("hello", "m"), Some(vec![1.0, 2.0]));
    assert!(cache.contains("hello", "m"));
    assert!(cache.get("hello", "other-model").is_none());
}

#[test]
fn duplicate_write_is_a_no_op() {
    let cache = EmbeddingCache::new();
    cache.put("hello", "m", vec![0.5, 0.5]);
    let len_after_first = cache.len();
    let value_after_first = cache.get("hello", "m");

    assert_eq!(cache.put("hello", "m", vec![0.5, 0.5]), CachePut::AlreadyPresent);
    assert_eq!(cache.len(), len_after_first);
    assert_eq!(cache.get("hello", "m"), value_after_first);
}

#[test]
fn conflicting_write_keeps_first_value() {
    let cache = EmbeddingCache::new();
    cache.put("hello", "m", vec![1.0]);
    assert_eq!(cache.put("hello", "m", vec![2.0]), CachePut::Conflict);
    assert_eq!(cache.get("hello", "m"), Some(vec![1.0]));
    assert_eq!(cache.len(), 1);
}

#[test]
fn normalized_text_shares_entry() {
    let cache = EmbeddingCache::new();
    cache.put("hello  world", "m", vec![1.0]);
    assert_eq!(cache.get(" hello world\n", "m"), Some(vec![1.0]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_double_miss_stores_one_entry() {
    let cache = Arc::new(EmbeddingCache::new());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.put("same text", "m", vec![0.25, 0.75]) })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            CachePut::Inserted => inserted += 1,
            CachePut::AlreadyPresent => {}
            CachePut::Conflict => panic!("identical writes must not conflict"),
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("same text", "m"), Some(vec![0.25, 0.75]));
}

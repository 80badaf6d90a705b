use std::sync::Arc;

use quarry_core::{Chunk, RankedList, RetrievalResult};
use quarry_retrieval::{FusionWeights, RankFusion};

fn list(source: &str, hits: &[(&str, f32)]) -> RankedList {
    let results = hits
        .iter()
        .enumerate()
        .map(|(idx, (id, score))| RetrievalResult {
            chunk: Arc::new(Chunk::new(*id, "doc", 0, format!("content of {id}"))),
            score: *score,
            rank: idx + 1,
            retriever: source.to_string(),
        })
        .collect();
    RankedList::new(source, results)
}

fn ids(fused: &[quarry_core::FusedResult]) -> Vec<&str> {
    fused.iter().map(|f| f.chunk.id.as_str()).collect()
}

#[test]
fn rrf_combines_two_lists() {
    let dense = list("dense", &[("A", 0.9), ("B", 0.8), ("C", 0.7)]);
    let sparse = list("sparse", &[("B", 12.0), ("A", 9.0), ("D", 3.0)]);

    let fused = RankFusion::rrf().fuse(&[dense, sparse]);

    // A and B both score 1/61 + 1/62; A wins on chunk id.
    assert_eq!(ids(&fused), vec!["A", "B", "C", "D"]);
    let expected = 1.0 / 61.0 + 1.0 / 62.0;
    assert!((fused[0].score - expected).abs() < 1e-12);
    assert!((fused[1].score - expected).abs() < 1e-12);
    assert!((fused[2].score - 1.0 / 63.0).abs() < 1e-12);
    assert!((fused[3].score - 1.0 / 63.0).abs() < 1e-12);
}

#[test]
fn rrf_records_contributions() {
    let dense = list("dense", &[("A", 0.9), ("B", 0.8)]);
    let sparse = list("sparse", &[("B", 12.0)]);

    let fused = RankFusion::rrf().fuse(&[dense, sparse]);
    let b = fused.iter().find(|f| f.chunk.id == "B").unwrap();

    assert_eq!(b.contributions.len(), 2);
    assert_eq!(b.best_rank(), 1);
    assert!(b.contributions.iter().any(|c| c.source == "dense" && c.rank == 2));
    assert!(b.contributions.iter().any(|c| c.source == "sparse" && c.rank == 1));
}

#[test]
fn fusion_is_deterministic() {
    let lists = vec![
        list("dense", &[("x", 0.5), ("y", 0.5), ("z", 0.4)]),
        list("sparse", &[("z", 2.0), ("w", 1.0)]),
    ];
    let fusion = RankFusion::rrf();

    let first = fusion.fuse(&lists);
    for _ in 0..10 {
        assert_eq!(fusion.fuse(&lists), first);
    }
}

#[test]
fn output_is_the_union_of_inputs() {
    let fused = RankFusion::rrf().fuse(&[
        list("dense", &[("a", 1.0), ("b", 0.5)]),
        list("sparse", &[("c", 3.0)]),
        list("extra", &[("b", 1.0), ("d", 0.1)]),
    ]);

    let mut got = ids(&fused);
    got.sort();
    assert_eq!(got, vec!["a", "b", "c", "d"]);
}

#[test]
fn single_list_keeps_its_order() {
    let fused = RankFusion::rrf().fuse(&[list("sparse", &[("q", 3.0), ("a", 2.0), ("m", 1.0)])]);
    assert_eq!(ids(&fused), vec!["q", "a", "m"]);
}

#[test]
fn empty_inputs_fuse_to_empty() {
    assert!(RankFusion::rrf().fuse(&[]).is_empty());
    assert!(RankFusion::rrf()
        .fuse(&[list("dense", &[]), list("sparse", &[])])
        .is_empty());
}

#[test]
fn duplicates_within_a_list_count_once() {
    let fused = RankFusion::rrf().fuse(&[list("dense", &[("a", 0.9), ("a", 0.8), ("b", 0.7)])]);

    assert_eq!(fused.len(), 2);
    assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
    // b keeps the position it would have without the duplicate
    assert!((fused[1].score - 1.0 / 62.0).abs() < 1e-12);
}

#[test]
fn custom_rrf_constant() {
    let fused = RankFusion::with_rrf_k(1.0).fuse(&[list("dense", &[("a", 0.9), ("b", 0.8)])]);
    assert!((fused[0].score - 0.5).abs() < 1e-12);
    assert!((fused[1].score - 1.0 / 3.0).abs() < 1e-12);
}

#[test]
fn weighted_fusion_uses_min_max_scaled_scores() {
    let weights = FusionWeights::new([("dense", 0.7), ("sparse", 0.3)]).unwrap();
    let fused = RankFusion::weighted(weights).fuse(&[
        list("dense", &[("a", 0.9), ("b", 0.5), ("c", 0.1)]),
        list("sparse", &[("c", 20.0), ("b", 10.0)]),
    ]);

    // a: 0.7 * 1.0; b: 0.7 * 0.5 + 0.3 * 0.0; c: 0.7 * 0.0 + 0.3 * 1.0
    assert_eq!(ids(&fused), vec!["a", "b", "c"]);
    assert!((fused[0].score - 0.7).abs() < 1e-9);
    assert!((fused[1].score - 0.35).abs() < 1e-6);
    assert!((fused[2].score - 0.3).abs() < 1e-9);
}

#[test]
fn weighted_fusion_constant_list_maps_to_one() {
    let weights = FusionWeights::new([("dense", 0.5), ("sparse", 0.5)]).unwrap();
    let fused = RankFusion::weighted(weights).fuse(&[
        list("dense", &[("a", 0.4), ("b", 0.4)]),
        list("sparse", &[]),
    ]);

    assert_eq!(ids(&fused), vec!["a", "b"]);
    assert!((fused[0].score - 0.5).abs() < 1e-12);
    assert!((fused[1].score - 0.5).abs() < 1e-12);
}

#[test]
fn weighted_fusion_ignores_unweighted_lists() {
    let weights = FusionWeights::new([("dense", 1.0)]).unwrap();
    let fused = RankFusion::weighted(weights).fuse(&[
        list("dense", &[("a", 0.2)]),
        list("other", &[("b", 9.0)]),
    ]);

    assert_eq!(ids(&fused), vec!["a", "b"]);
    assert_eq!(fused[1].score, 0.0);
}

#[test]
fn secondary_fusion_over_fused_lists() {
    let first = RankFusion::rrf().fuse(&[list("dense", &[("a", 0.9), ("b", 0.1)])]);
    let second = RankFusion::rrf().fuse(&[list("sparse", &[("b", 4.0), ("c", 1.0)])]);

    let merged = RankFusion::rrf().fuse(&[
        RankedList::from_fused("subquery-0", &first),
        RankedList::from_fused("subquery-1", &second),
    ]);

    assert_eq!(merged[0].chunk.id, "b");
    assert_eq!(merged.len(), 3);
}

use std::sync::Arc;

use quarry_core::{
    Chunk, Contribution, Degradation, DegradationReason, FusedResult, Generation, Outcome, Query,
    RankedList, RetrievalResult, Stage, SubQuery,
};
use serde_json::json;

fn chunk(id: &str) -> Arc<Chunk> {
    Arc::new(Chunk::new(id, "doc", 0, format!("content of {id}")))
}

#[test]
fn chunk_matches_equality_filters() {
    let c = Chunk::new("c1", "doc", 0, "text")
        .with_metadata("lang", json!("en"))
        .with_metadata("year", json!(2024));

    let mut filters = std::collections::HashMap::new();
    assert!(c.matches(&filters));

    filters.insert("lang".to_string(), json!("en"));
    assert!(c.matches(&filters));

    filters.insert("year".to_string(), json!(2023));
    assert!(!c.matches(&filters));
}

#[test]
fn ranked_sorts_descending_with_id_tie_break() {
    let scored = vec![
        (chunk("b"), 0.5),
        (chunk("a"), 0.5),
        (chunk("c"), 0.9),
        (chunk("d"), 0.1),
    ];

    let results = RetrievalResult::ranked("dense", scored, 3);
    let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();

    assert_eq!(ids, vec!["c", "a", "b"]);
    assert_eq!(results[0].rank, 1);
    assert_eq!(results[2].rank, 3);
    assert!(results.iter().all(|r| r.retriever == "dense"));
}

#[test]
fn fused_ordering_uses_best_rank_then_id() {
    let a = FusedResult {
        chunk: chunk("a"),
        score: 1.0,
        contributions: vec![Contribution {
            source: "x".into(),
            rank: 2,
            score: 0.0,
        }],
    };
    let b = FusedResult {
        chunk: chunk("b"),
        score: 1.0,
        contributions: vec![Contribution {
            source: "x".into(),
            rank: 1,
            score: 0.0,
        }],
    };
    let mut list = vec![a.clone(), b.clone()];
    list.sort_by(FusedResult::ordering);
    assert_eq!(list[0].chunk.id, "b");

    let b_same_rank = FusedResult {
        contributions: a.contributions.clone(),
        ..b
    };
    let mut list = vec![b_same_rank, a];
    list.sort_by(FusedResult::ordering);
    assert_eq!(list[0].chunk.id, "a");
}

#[test]
fn ranked_list_from_fused_reassigns_ranks() {
    let fused = vec![
        FusedResult {
            chunk: chunk("a"),
            score: 0.3,
            contributions: vec![],
        },
        FusedResult {
            chunk: chunk("b"),
            score: 0.2,
            contributions: vec![],
        },
    ];

    let list = RankedList::from_fused("subquery-0", &fused);
    assert_eq!(list.source, "subquery-0");
    assert_eq!(list.len(), 2);
    assert_eq!(list.results[1].rank, 2);
    assert_eq!(list.results[1].retriever, "subquery-0");
}

#[test]
fn outcome_tracks_degradations() {
    let clean = Outcome::clean(1);
    assert!(!clean.is_degraded());

    let degraded = Outcome::degraded(
        2,
        Degradation::new(
            Stage::Reranking,
            DegradationReason::RerankUnavailable,
            "model offline",
        ),
    );
    assert!(degraded.is_degraded());
    assert!(degraded.has_reason(DegradationReason::RerankUnavailable));

    let mapped = degraded.map(|v| v * 10);
    assert_eq!(mapped.value, 20);
    assert_eq!(mapped.degradations.len(), 1);
}

#[test]
fn generation_confidence_from_log_probs() {
    let certain = Generation::from_log_probs("x", &[0.0, 0.0]);
    assert!((certain.confidence - 1.0).abs() < 1e-6);

    let unsure = Generation::from_log_probs("x", &[-2.0, -2.0]);
    assert!(unsure.confidence < 0.2);

    let empty = Generation::from_log_probs("x", &[]);
    assert_eq!(empty.confidence, 0.0);

    assert_eq!(Generation::new("x", 3.0).confidence, 1.0);
}

#[test]
fn sub_query_references_parent() {
    let query = Query::new("a and b").with_profile("fast");
    let sub = SubQuery::new(&query, 1, "b");

    assert_eq!(sub.parent_id, query.id);
    assert_eq!(sub.source_name(), "subquery-1");
}

#[test]
fn query_round_trips_through_json() {
    let query = Query::new("what is rust").with_filter("lang", json!("en"));
    let encoded = serde_json::to_string(&query).unwrap();
    let decoded: Query = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, query);
}

#[test]
fn stage_display_is_snake_case() {
    assert_eq!(Stage::Reranking.to_string(), "reranking");
    assert_eq!(Stage::Done.to_string(), "done");
}

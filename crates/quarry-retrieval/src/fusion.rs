//! Rank fusion: merge named ranked lists into one consensus ranking.
//!
//! Two modes are supported:
//!
//! - **RRF**: `score = Σ 1 / (rank + k)` over the lists containing the chunk,
//!   with 1-based ranks and `k` defaulting to 60.
//! - **Weighted**: `score = Σ weight(list) × minmax(score)`, where each list's
//!   raw scores are min-max scaled to `[0, 1]` within that list.
//!
//! Output is deterministic: fused score descending, then the best rank the
//! chunk held in any list, then chunk id.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use quarry_core::{Chunk, Contribution, FusedResult, QuarryError, RankedList};

/// Standard RRF constant (k parameter in the RRF formula).
pub const DEFAULT_RRF_K: f64 = 60.0;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Per-list weights for weighted fusion. Always non-negative and summing to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionWeights {
    weights: BTreeMap<String, f64>,
}

impl FusionWeights {
    /// Weights that must already sum to 1.
    pub fn new<S: Into<String>>(
        weights: impl IntoIterator<Item = (S, f64)>,
    ) -> Result<Self, QuarryError> {
        let weights = collect_weights(weights)?;
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(QuarryError::Validation(format!(
                "fusion weights must sum to 1, got {sum}"
            )));
        }
        Ok(Self { weights })
    }

    /// Weights scaled so they sum to 1.
    pub fn normalized<S: Into<String>>(
        weights: impl IntoIterator<Item = (S, f64)>,
    ) -> Result<Self, QuarryError> {
        let mut weights = collect_weights(weights)?;
        let sum: f64 = weights.values().sum();
        if sum <= 0.0 {
            return Err(QuarryError::Validation(
                "fusion weights must have a positive sum".to_string(),
            ));
        }
        for w in weights.values_mut() {
            *w /= sum;
        }
        Ok(Self { weights })
    }

    /// Equal weight for every named list.
    pub fn uniform<S: Into<String>>(
        names: impl IntoIterator<Item = S>,
    ) -> Result<Self, QuarryError> {
        Self::normalized(names.into_iter().map(|n| (n, 1.0)))
    }

    /// Weight of a list; lists without a weight contribute nothing.
    pub fn get(&self, source: &str) -> f64 {
        self.weights.get(source).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

fn collect_weights<S: Into<String>>(
    weights: impl IntoIterator<Item = (S, f64)>,
) -> Result<BTreeMap<String, f64>, QuarryError> {
    let mut map = BTreeMap::new();
    for (name, weight) in weights {
        let name = name.into();
        if !weight.is_finite() || weight < 0.0 {
            return Err(QuarryError::Validation(format!(
                "fusion weight for '{name}' must be a non-negative number, got {weight}"
            )));
        }
        if map.insert(name.clone(), weight).is_some() {
            return Err(QuarryError::Validation(format!(
                "duplicate fusion weight for '{name}'"
            )));
        }
    }
    if map.is_empty() {
        return Err(QuarryError::Validation(
            "fusion weights must name at least one list".to_string(),
        ));
    }
    Ok(map)
}

/// How fused scores are computed.
#[derive(Debug, Clone, PartialEq)]
pub enum FusionMode {
    Rrf { k: f64 },
    Weighted(FusionWeights),
}

impl Default for FusionMode {
    fn default() -> Self {
        FusionMode::Rrf { k: DEFAULT_RRF_K }
    }
}

/// The rank fusion engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RankFusion {
    mode: FusionMode,
}

impl RankFusion {
    pub fn new(mode: FusionMode) -> Self {
        Self { mode }
    }

    /// Reciprocal rank fusion with the default constant.
    pub fn rrf() -> Self {
        Self::new(FusionMode::default())
    }

    pub fn with_rrf_k(k: f64) -> Self {
        Self::new(FusionMode::Rrf { k })
    }

    pub fn weighted(weights: FusionWeights) -> Self {
        Self::new(FusionMode::Weighted(weights))
    }

    pub fn mode(&self) -> &FusionMode {
        &self.mode
    }

    /// Fuse lists into a single ranking containing the union of their chunks.
    ///
    /// Each input list is assumed sorted best-first; a chunk repeated within
    /// one list only counts at its first position.
    pub fn fuse(&self, lists: &[RankedList]) -> Vec<FusedResult> {
        let mut fused: HashMap<String, FusedResult> = HashMap::new();

        for list in lists {
            let mut seen = HashSet::new();
            let entries: Vec<(Arc<Chunk>, f32)> = list
                .results
                .iter()
                .filter(|r| seen.insert(r.chunk.id.clone()))
                .map(|r| (r.chunk.clone(), r.score))
                .collect();

            let contribution_of = self.contribution_fn(&list.source, &entries);

            for (idx, (chunk, raw_score)) in entries.iter().enumerate() {
                let rank = idx + 1;
                let score = contribution_of(rank, *raw_score);
                let entry = fused
                    .entry(chunk.id.clone())
                    .or_insert_with(|| FusedResult {
                        chunk: chunk.clone(),
                        score: 0.0,
                        contributions: Vec::new(),
                    });
                entry.score += score;
                entry.contributions.push(Contribution {
                    source: list.source.clone(),
                    rank,
                    score: *raw_score,
                });
            }
        }

        let mut results: Vec<FusedResult> = fused.into_values().collect();
        results.sort_by(FusedResult::ordering);
        results
    }

    fn contribution_fn(
        &self,
        source: &str,
        entries: &[(Arc<Chunk>, f32)],
    ) -> Box<dyn Fn(usize, f32) -> f64> {
        match &self.mode {
            FusionMode::Rrf { k } => {
                let k = *k;
                Box::new(move |rank, _| 1.0 / (rank as f64 + k))
            }
            FusionMode::Weighted(weights) => {
                let weight = weights.get(source);
                let (min, max) = entries.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, e| {
                    let s = e.1 as f64;
                    (acc.0.min(s), acc.1.max(s))
                });
                let span = max - min;
                Box::new(move |_, raw| {
                    // a list whose scores are all equal maps every entry to 1
                    let normalized = if span > 0.0 {
                        (raw as f64 - min) / span
                    } else {
                        1.0
                    };
                    weight * normalized
                })
            }
        }
    }
}

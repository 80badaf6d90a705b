use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use quarry_core::QuarryError;
use quarry_retrieval::{FusionMode, FusionWeights, RankFusion};
use serde::{Deserialize, Serialize};

/// Name of the profile used when a query does not select one.
pub const DEFAULT_PROFILE: &str = "balanced";

/// Fusion settings as they appear in a profile file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum FusionConfig {
    Rrf { k: f64 },
    Weighted { weights: BTreeMap<String, f64> },
}

/// A raw, unvalidated profile. Every field is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub name: String,
    pub decompose: bool,
    pub hyde: bool,
    pub rerank: bool,
    pub compress: bool,
    /// Number of results returned to the caller.
    pub top_k: usize,
    /// Candidates requested from each retriever.
    pub retrieval_k: usize,
    pub fusion: FusionConfig,
    pub rerank_top_n: usize,
    /// Target output/input length ratio for compression, in `(0, 1]`.
    pub compression_ratio: f32,
    /// Minimum HyDE confidence, in `[0, 1]`.
    pub hyde_threshold: f32,
    pub max_subqueries: usize,
    /// Soft end-to-end latency budget in milliseconds.
    pub latency_budget_ms: u64,
}

/// Per-stage time allowances carved out of the latency budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBudgets {
    pub enhance: Duration,
    pub retrieve: Duration,
    pub rerank: Duration,
    pub compress: Duration,
}

impl StageBudgets {
    /// Enhance 20%, retrieve 35%, rerank 30%, compress 15%.
    pub fn from_latency_budget(budget: Duration) -> Self {
        Self {
            enhance: budget * 20 / 100,
            retrieve: budget * 35 / 100,
            rerank: budget * 30 / 100,
            compress: budget * 15 / 100,
        }
    }
}

/// A validated pipeline profile.
///
/// Only obtainable through [`TryFrom<ProfileConfig>`] or the built-in
/// presets, so an existing `Profile` is always internally consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    name: String,
    decompose: bool,
    hyde: bool,
    rerank: bool,
    compress: bool,
    top_k: usize,
    retrieval_k: usize,
    fusion: RankFusion,
    rerank_top_n: usize,
    compression_ratio: f32,
    hyde_threshold: f32,
    max_subqueries: usize,
    latency_budget: Duration,
}

impl TryFrom<ProfileConfig> for Profile {
    type Error = QuarryError;

    fn try_from(config: ProfileConfig) -> Result<Self, Self::Error> {
        let invalid =
            |msg: String| QuarryError::Config(format!("profile '{}': {msg}", config.name));

        if config.name.trim().is_empty() {
            return Err(QuarryError::Config("profile name must not be empty".to_string()));
        }
        if config.top_k == 0 {
            return Err(invalid("top_k must be at least 1".to_string()));
        }
        if config.retrieval_k < config.top_k {
            return Err(invalid(format!(
                "retrieval_k ({}) must be at least top_k ({})",
                config.retrieval_k, config.top_k
            )));
        }
        if config.rerank && config.rerank_top_n == 0 {
            return Err(invalid(
                "rerank_top_n must be at least 1 when reranking is enabled".to_string(),
            ));
        }
        if !(config.compression_ratio > 0.0 && config.compression_ratio <= 1.0) {
            return Err(invalid(format!(
                "compression_ratio must be in (0, 1], got {}",
                config.compression_ratio
            )));
        }
        if !(0.0..=1.0).contains(&config.hyde_threshold) {
            return Err(invalid(format!(
                "hyde_threshold must be in [0, 1], got {}",
                config.hyde_threshold
            )));
        }
        if config.max_subqueries == 0 {
            return Err(invalid("max_subqueries must be at least 1".to_string()));
        }
        if config.latency_budget_ms == 0 {
            return Err(invalid("latency_budget_ms must be positive".to_string()));
        }

        let fusion = match &config.fusion {
            FusionConfig::Rrf { k } if k.is_finite() && *k > 0.0 => RankFusion::with_rrf_k(*k),
            FusionConfig::Rrf { k } => {
                return Err(invalid(format!("rrf k must be positive, got {k}")));
            }
            FusionConfig::Weighted { weights } => {
                let weights = FusionWeights::new(weights.iter().map(|(n, w)| (n.clone(), *w)))
                    .map_err(|e| invalid(e.to_string()))?;
                RankFusion::weighted(weights)
            }
        };

        Ok(Self {
            name: config.name,
            decompose: config.decompose,
            hyde: config.hyde,
            rerank: config.rerank,
            compress: config.compress,
            top_k: config.top_k,
            retrieval_k: config.retrieval_k,
            fusion,
            rerank_top_n: config.rerank_top_n,
            compression_ratio: config.compression_ratio,
            hyde_threshold: config.hyde_threshold,
            max_subqueries: config.max_subqueries,
            latency_budget: Duration::from_millis(config.latency_budget_ms),
        })
    }
}

impl Profile {
    /// Plain hybrid retrieval and fusion, nothing optional.
    pub fn fast() -> Self {
        Self {
            name: "fast".to_string(),
            decompose: false,
            hyde: false,
            rerank: false,
            compress: false,
            top_k: 5,
            retrieval_k: 20,
            fusion: RankFusion::rrf(),
            rerank_top_n: 20,
            compression_ratio: 0.6,
            hyde_threshold: 0.5,
            max_subqueries: 1,
            latency_budget: Duration::from_millis(300),
        }
    }

    /// Decomposition and reranking on, HyDE and compression off.
    pub fn balanced() -> Self {
        Self {
            name: DEFAULT_PROFILE.to_string(),
            decompose: true,
            rerank: true,
            top_k: 8,
            retrieval_k: 30,
            max_subqueries: 3,
            latency_budget: Duration::from_millis(1500),
            ..Self::fast()
        }
    }

    /// Every stage on.
    pub fn thorough() -> Self {
        Self {
            name: "thorough".to_string(),
            decompose: true,
            hyde: true,
            rerank: true,
            compress: true,
            top_k: 10,
            retrieval_k: 50,
            rerank_top_n: 40,
            max_subqueries: 4,
            latency_budget: Duration::from_millis(5000),
            ..Self::fast()
        }
    }

    /// The raw form of this profile, suitable for writing to a profile file.
    pub fn to_config(&self) -> ProfileConfig {
        let fusion = match self.fusion.mode() {
            FusionMode::Rrf { k } => FusionConfig::Rrf { k: *k },
            FusionMode::Weighted(weights) => FusionConfig::Weighted {
                weights: weights.iter().map(|(n, w)| (n.to_string(), w)).collect(),
            },
        };
        ProfileConfig {
            name: self.name.clone(),
            decompose: self.decompose,
            hyde: self.hyde,
            rerank: self.rerank,
            compress: self.compress,
            top_k: self.top_k,
            retrieval_k: self.retrieval_k,
            fusion,
            rerank_top_n: self.rerank_top_n,
            compression_ratio: self.compression_ratio,
            hyde_threshold: self.hyde_threshold,
            max_subqueries: self.max_subqueries,
            latency_budget_ms: self.latency_budget.as_millis() as u64,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decompose(&self) -> bool {
        self.decompose
    }

    pub fn hyde(&self) -> bool {
        self.hyde
    }

    pub fn rerank(&self) -> bool {
        self.rerank
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn retrieval_k(&self) -> usize {
        self.retrieval_k
    }

    pub fn fusion(&self) -> &RankFusion {
        &self.fusion
    }

    pub fn rerank_top_n(&self) -> usize {
        self.rerank_top_n
    }

    pub fn compression_ratio(&self) -> f32 {
        self.compression_ratio
    }

    pub fn hyde_threshold(&self) -> f32 {
        self.hyde_threshold
    }

    pub fn max_subqueries(&self) -> usize {
        self.max_subqueries
    }

    pub fn latency_budget(&self) -> Duration {
        self.latency_budget
    }

    pub fn budgets(&self) -> StageBudgets {
        StageBudgets::from_latency_budget(self.latency_budget)
    }

    /// Lists named by fusion weights, if the profile uses weighted fusion.
    pub fn weighted_sources(&self) -> Vec<&str> {
        match self.fusion.mode() {
            FusionMode::Weighted(weights) => weights.iter().map(|(name, _)| name).collect(),
            FusionMode::Rrf { .. } => Vec::new(),
        }
    }
}

/// Named profiles, with a default used when a query names none.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: HashMap<String, Profile>,
    default: String,
}

impl ProfileRegistry {
    /// An empty registry whose default is [`DEFAULT_PROFILE`].
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            default: DEFAULT_PROFILE.to_string(),
        }
    }

    /// A registry holding the `fast`, `balanced` and `thorough` presets.
    pub fn with_presets() -> Self {
        let mut registry = Self::new();
        registry.register(Profile::fast());
        registry.register(Profile::balanced());
        registry.register(Profile::thorough());
        registry
    }

    /// Parse a JSON array of profiles and register them over the presets.
    pub fn from_json_str(json: &str) -> Result<Self, QuarryError> {
        let configs: Vec<ProfileConfig> = serde_json::from_str(json)
            .map_err(|e| QuarryError::Config(format!("invalid profile file: {e}")))?;
        let mut registry = Self::with_presets();
        for config in configs {
            registry.register(Profile::try_from(config)?);
        }
        Ok(registry)
    }

    /// Add or replace a profile.
    pub fn register(&mut self, profile: Profile) -> &mut Self {
        self.profiles.insert(profile.name.clone(), profile);
        self
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Result<Self, QuarryError> {
        let name = name.into();
        if !self.profiles.contains_key(&name) {
            return Err(QuarryError::Config(format!("unknown default profile '{name}'")));
        }
        self.default = name;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// The named profile, or the default when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<&Profile, QuarryError> {
        let name = name.unwrap_or(&self.default);
        self.profiles
            .get(name)
            .ok_or_else(|| QuarryError::Config(format!("unknown profile '{name}'")))
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::with_presets()
    }
}

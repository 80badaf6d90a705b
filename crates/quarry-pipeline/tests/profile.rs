use std::time::Duration;

use quarry_pipeline::{Profile, ProfileRegistry, QuarryError};
use quarry_retrieval::FusionMode;

const PROFILE: &str = r#"[{
    "name": "research",
    "decompose": true,
    "hyde": true,
    "rerank": true,
    "compress": false,
    "top_k": 12,
    "retrieval_k": 60,
    "fusion": {"mode": "rrf", "k": 30.0},
    "rerank_top_n": 25,
    "compression_ratio": 0.5,
    "hyde_threshold": 0.7,
    "max_subqueries": 4,
    "latency_budget_ms": 4000
}]"#;

#[test]
fn profile_file_registers_over_presets() -> Result<(), QuarryError> {
    let registry = ProfileRegistry::from_json_str(PROFILE)?;
    assert_eq!(registry.len(), 4);

    let research = registry.resolve(Some("research"))?;
    assert!(research.decompose());
    assert!(research.hyde());
    assert!(!research.compress());
    assert_eq!(research.top_k(), 12);
    assert_eq!(research.retrieval_k(), 60);
    assert_eq!(research.rerank_top_n(), 25);
    assert_eq!(research.fusion().mode(), &FusionMode::Rrf { k: 30.0 });
    assert_eq!(research.latency_budget(), Duration::from_millis(4000));
    assert_eq!(research.budgets().retrieve, Duration::from_millis(1400));
    Ok(())
}

#[test]
fn profile_file_can_override_a_preset() -> Result<(), QuarryError> {
    let json = PROFILE.replace("\"research\"", "\"fast\"");
    let registry = ProfileRegistry::from_json_str(&json)?;
    assert_eq!(registry.len(), 3);
    assert!(registry.resolve(Some("fast"))?.hyde());
    Ok(())
}

#[test]
fn invalid_profiles_are_config_errors() {
    let cases = [
        ("\"top_k\": 12", "\"top_k\": 0"),
        ("\"retrieval_k\": 60", "\"retrieval_k\": 5"),
        ("\"compression_ratio\": 0.5", "\"compression_ratio\": 1.5"),
        ("\"hyde_threshold\": 0.7", "\"hyde_threshold\": -0.1"),
        ("\"k\": 30.0", "\"k\": 0.0"),
        ("\"latency_budget_ms\": 4000", "\"latency_budget_ms\": 0"),
        ("\"max_subqueries\": 4", "\"max_subqueries\": 0"),
    ];
    for (from, to) in cases {
        let json = PROFILE.replace(from, to);
        let result = ProfileRegistry::from_json_str(&json);
        assert!(
            matches!(result, Err(QuarryError::Config(_))),
            "{to} should be rejected"
        );
    }
}

#[test]
fn unknown_fields_and_bad_weights_are_rejected() {
    let extra = PROFILE.replace("\"top_k\": 12", "\"top_k\": 12, \"temperature\": 0.2");
    assert!(matches!(
        ProfileRegistry::from_json_str(&extra),
        Err(QuarryError::Config(_))
    ));

    let weights = PROFILE.replace(
        "{\"mode\": \"rrf\", \"k\": 30.0}",
        "{\"mode\": \"weighted\", \"weights\": {\"dense\": 0.9, \"sparse\": 0.9}}",
    );
    assert!(matches!(
        ProfileRegistry::from_json_str(&weights),
        Err(QuarryError::Config(_))
    ));
}

#[test]
fn default_profile_can_be_changed() -> Result<(), QuarryError> {
    let registry = ProfileRegistry::with_presets().with_default("fast")?;
    assert_eq!(registry.resolve(None)?.name(), "fast");

    assert!(ProfileRegistry::with_presets().with_default("missing").is_err());
    assert!(matches!(
        registry.resolve(Some("missing")),
        Err(QuarryError::Config(_))
    ));
    Ok(())
}

#[test]
fn profile_config_round_trips_through_json() -> Result<(), QuarryError> {
    let profile = Profile::thorough();
    let json = serde_json::to_string(&profile.to_config())
        .map_err(|e| QuarryError::Parsing(e.to_string()))?;
    let registry = ProfileRegistry::from_json_str(&format!("[{json}]"))?;
    assert_eq!(registry.resolve(Some("thorough"))?, &profile);
    Ok(())
}

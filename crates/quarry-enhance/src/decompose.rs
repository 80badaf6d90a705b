use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use quarry_core::{
    Degradation, DegradationReason, GenerationRequest, Generator, Outcome, QuarryError, Query,
    Stage, SubQuery,
};
use regex::Regex;

/// Default upper bound on sub-queries produced for one query.
pub const DEFAULT_MAX_SUBQUERIES: usize = 4;

/// Splits a query into independently retrievable sub-questions.
///
/// A query that asks a single thing decomposes to itself. Implementations must
/// be deterministic so repeated decomposition yields the same sub-queries.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, query: &str, max_subqueries: usize)
        -> Result<Vec<String>, QuarryError>;
}

// ---------------------------------------------------------------------------
// Heuristic decomposition
// ---------------------------------------------------------------------------

fn clause_boundary() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(?:,?\s+(?:and|also|plus)\s+|\s*;\s*)",
            r"(how|what|why|when|where|who|which|does|do|did|is|are|can|should)\b",
        ))
        .expect("clause boundary pattern is valid")
    })
}

fn list_item() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?:\d+[.)]|[-*\u{2022}])\s+(.+?)\s*$").expect("list item pattern is valid")
    })
}

/// Rule-based decomposition.
///
/// A query is multi-part when it contains several question marks, or a
/// conjunction (`and`, `also`, `plus`, `;`) directly followed by an
/// interrogative word. Each part becomes a capitalized question.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicDecomposer;

impl HeuristicDecomposer {
    pub fn new() -> Self {
        Self
    }

    /// Split `query` into parts. Returns the trimmed query alone when it is not multi-part.
    pub fn split(&self, query: &str, max_subqueries: usize) -> Vec<String> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let mut parts = Vec::new();
        for sentence in trimmed.split('?') {
            let mut last = 0;
            for caps in clause_boundary().captures_iter(sentence) {
                let (Some(boundary), Some(word)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                parts.push(&sentence[last..boundary.start()]);
                last = word.start();
            }
            parts.push(&sentence[last..]);
        }

        let parts: Vec<&str> = parts
            .into_iter()
            .map(clean_fragment)
            .filter(|p| !p.is_empty())
            .collect();

        // a one-word fragment means the split cut through a single question
        if parts.len() < 2 || parts.iter().any(|p| p.split_whitespace().count() < 2) {
            return vec![trimmed.to_string()];
        }

        let mut seen = HashSet::new();
        parts
            .into_iter()
            .map(as_question)
            .filter(|q| seen.insert(q.to_lowercase()))
            .take(max_subqueries.max(1))
            .collect()
    }
}

fn clean_fragment(fragment: &str) -> &str {
    fragment
        .trim()
        .trim_end_matches(|c: char| matches!(c, '?' | '.' | '!' | ',' | ';') || c.is_whitespace())
}

fn as_question(fragment: &str) -> String {
    let mut chars = fragment.chars();
    match chars.next() {
        Some(first) => format!("{}{}?", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

/// True if the heuristic decomposer would split `query` into several parts.
pub fn is_multi_part(query: &str) -> bool {
    HeuristicDecomposer.split(query, usize::MAX).len() > 1
}

#[async_trait]
impl Decomposer for HeuristicDecomposer {
    async fn decompose(
        &self,
        query: &str,
        max_subqueries: usize,
    ) -> Result<Vec<String>, QuarryError> {
        Ok(self.split(query, max_subqueries))
    }
}

// ---------------------------------------------------------------------------
// Model-backed decomposition
// ---------------------------------------------------------------------------

/// Decomposition delegated to a generation model.
///
/// The model is asked for a numbered list of sub-questions. Parsed results are
/// cached by exact query string. When the model fails or returns nothing
/// usable, the heuristic decomposer answers instead (and nothing is cached).
pub struct ModelDecomposer {
    generator: Arc<dyn Generator>,
    fallback: HeuristicDecomposer,
    cache: DashMap<String, Vec<String>>,
}

impl ModelDecomposer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            fallback: HeuristicDecomposer,
            cache: DashMap::new(),
        }
    }

    /// Number of cached decompositions.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn prompt(query: &str, max_subqueries: usize) -> String {
        format!(
            "Break the following question into at most {max_subqueries} self-contained \
             sub-questions that can each be answered by searching a document collection. \
             If the question asks only one thing, return it unchanged. Output one \
             sub-question per line as a numbered list, nothing else.\n\nQuestion: {query}"
        )
    }

    async fn ask_model(
        &self,
        query: &str,
        max_subqueries: usize,
    ) -> Result<Vec<String>, QuarryError> {
        let request =
            GenerationRequest::new(Self::prompt(query, max_subqueries)).with_temperature(0.0);
        let generation = self.generator.generate(request).await?;
        let parsed = parse_list(&generation.text);
        if parsed.is_empty() {
            return Err(QuarryError::Parsing(
                "decomposition response contained no sub-questions".to_string(),
            ));
        }
        Ok(parsed)
    }
}

/// Parse numbered or bulleted lines. Falls back to plain non-empty lines when
/// no line carries a list marker.
fn parse_list(text: &str) -> Vec<String> {
    let marked: Vec<String> = text
        .lines()
        .filter_map(|line| list_item().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();

    let items = if marked.is_empty() {
        text.lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    } else {
        marked
    };

    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect()
}

#[async_trait]
impl Decomposer for ModelDecomposer {
    async fn decompose(
        &self,
        query: &str,
        max_subqueries: usize,
    ) -> Result<Vec<String>, QuarryError> {
        let max_subqueries = max_subqueries.max(1);
        if let Some(cached) = self.cache.get(query) {
            return Ok(cached.iter().take(max_subqueries).cloned().collect());
        }

        match self.ask_model(query, max_subqueries).await {
            Ok(parts) => {
                let parts = self
                    .cache
                    .entry(query.to_string())
                    .or_insert(parts)
                    .clone();
                Ok(parts.into_iter().take(max_subqueries).collect())
            }
            Err(QuarryError::Cancelled) => Err(QuarryError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "model decomposition failed, using heuristic split");
                self.fallback.decompose(query, max_subqueries).await
            }
        }
    }
}

/// Decompose `query` into ordered [`SubQuery`] values.
///
/// Never fails: a decomposer error yields the original query as the only
/// sub-query, recorded as an `EnhancementFailed` degradation.
pub async fn decompose_query(
    decomposer: &dyn Decomposer,
    query: &Query,
    max_subqueries: usize,
) -> Outcome<Vec<SubQuery>> {
    let literal = || vec![SubQuery::new(query, 0, query.text.trim())];

    match decomposer.decompose(&query.text, max_subqueries).await {
        Ok(parts) if !parts.is_empty() => {
            let subqueries: Vec<SubQuery> = parts
                .into_iter()
                .enumerate()
                .map(|(index, text)| SubQuery::new(query, index, text))
                .collect();
            tracing::debug!(request_id = %query.id, count = subqueries.len(), "query decomposed");
            Outcome::clean(subqueries)
        }
        Ok(_) => Outcome::clean(literal()),
        Err(e) => Outcome::degraded(
            literal(),
            Degradation::new(
                Stage::Enhancing,
                DegradationReason::EnhancementFailed,
                format!("decomposition failed: {e}"),
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_conjoined_questions() {
        let parts = HeuristicDecomposer
            .split("What are transformers and how do they relate to attention?", 4);
        assert_eq!(
            parts,
            vec!["What are transformers?", "How do they relate to attention?"]
        );
    }

    #[test]
    fn splits_on_question_marks() {
        let parts = HeuristicDecomposer.split("What is BM25? Why use RRF?", 4);
        assert_eq!(parts, vec!["What is BM25?", "Why use RRF?"]);
    }

    #[test]
    fn single_question_is_unchanged() {
        let parts = HeuristicDecomposer.split("  How does salt and pepper taste?  ", 4);
        assert_eq!(parts, vec!["How does salt and pepper taste?"]);
        assert!(!is_multi_part("How does salt and pepper taste?"));
    }

    #[test]
    fn respects_max_subqueries() {
        let parts = HeuristicDecomposer.split("What is a? What is b? What is c?", 2);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn decomposition_is_idempotent() {
        let first = HeuristicDecomposer
            .split("What are transformers and how do they relate to attention?", 4);
        for part in &first {
            assert_eq!(HeuristicDecomposer.split(part, 4), vec![part.clone()]);
        }
    }

    #[test]
    fn parses_numbered_and_bulleted_lists() {
        assert_eq!(
            parse_list("Here you go:\n1. What is a?\n2) What is b?\n"),
            vec!["What is a?", "What is b?"]
        );
        assert_eq!(parse_list("- one thing\n* another"), vec!["one thing", "another"]);
        assert_eq!(parse_list("plain\n\nlines"), vec!["plain", "lines"]);
    }
}

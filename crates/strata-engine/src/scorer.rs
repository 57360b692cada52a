//! Pluggable relevance scoring for search.

use std::collections::HashSet;

use async_trait::async_trait;

/// Scores how well a record's content matches a query.
///
/// Implementations must return values in `[0.0, 1.0]`; the engine clamps
/// anything outside that range. The trait is async so that embedding
/// services can back it without blocking the search path.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn similarity(&self, query: &str, content: &str) -> f64;
}

/// Deterministic lexical scorer: the fraction of query tokens that also
/// appear in the content.
///
/// Good enough for tests and single-process deployments; production
/// setups typically inject an embedding-backed implementation instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenOverlapScorer;

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl RelevanceScorer for TokenOverlapScorer {
    async fn similarity(&self, query: &str, content: &str) -> f64 {
        let query_tokens = tokens(query);
        if query_tokens.is_empty() {
            return 0.0;
        }
        let content_tokens = tokens(content);
        let shared = query_tokens.intersection(&content_tokens).count();
        shared as f64 / query_tokens.len() as f64
    }
}

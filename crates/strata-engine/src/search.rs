//! Relevance search over episodic and canonical memory.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_store::RecordStore;
use strata_types::{LifecycleState, MemoryRecord, RecordFilter, RecordId, Tier, Timestamp};

use crate::error::EngineError;
use crate::scorer::RelevanceScorer;

/// How recency discounts similarity. Weights are in [0, 1] and never
/// increase with age.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum DecayCurve {
    /// Recency does not matter; raw similarity ranks alone.
    None,
    /// Weight halves every `half_life`.
    Exponential { half_life: Duration },
    /// Weight falls linearly to zero across `window`, then stays zero.
    Linear { window: Duration },
}

impl DecayCurve {
    pub fn weight(&self, age_ms: u64) -> f64 {
        match self {
            Self::None => 1.0,
            Self::Exponential { half_life } => {
                let half_life_ms = half_life.as_millis() as f64;
                if half_life_ms <= 0.0 {
                    return if age_ms == 0 { 1.0 } else { 0.0 };
                }
                0.5_f64.powf(age_ms as f64 / half_life_ms)
            }
            Self::Linear { window } => {
                let window_ms = window.as_millis() as f64;
                if window_ms <= 0.0 {
                    return if age_ms == 0 { 1.0 } else { 0.0 };
                }
                (1.0 - age_ms as f64 / window_ms).max(0.0)
            }
        }
    }
}

impl Default for DecayCurve {
    fn default() -> Self {
        Self::Exponential {
            half_life: Duration::from_secs(14 * 24 * 60 * 60),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    pub decay: DecayCurve,
    /// Character cap on index-view excerpts.
    pub excerpt_chars: usize,
    /// Result count when the caller does not pass a limit.
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            decay: DecayCurve::default(),
            excerpt_chars: 160,
            default_limit: 10,
        }
    }
}

/// How much of each hit the caller wants back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchView {
    /// Id, score, and a short excerpt.
    Index,
    /// The full record.
    Detail,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ResultView {
    Index { excerpt: String },
    Detail { record: MemoryRecord },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: RecordId,
    pub tier: Tier,
    /// similarity × recency weight, in [0, 1].
    pub score: f64,
    pub view: ResultView,
}

pub(crate) fn excerpt(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

/// Scores active L1/L2 records against a query and ranks them by
/// similarity discounted by age.
pub(crate) struct Searcher {
    store: Arc<dyn RecordStore>,
    scorer: Arc<dyn RelevanceScorer>,
    config: SearchConfig,
}

impl Searcher {
    pub(crate) fn new(
        store: Arc<dyn RecordStore>,
        scorer: Arc<dyn RelevanceScorer>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            config,
        }
    }

    /// Rank active records matching `query`.
    ///
    /// `tiers` defaults to episodic plus canonical; the working tier is
    /// session-scoped, not searchable, and rejected outright. Ties in
    /// score break toward the newer record. Records scoring zero are
    /// left out of the results.
    pub(crate) async fn search(
        &self,
        query: &str,
        view: SearchView,
        tiers: Option<&[Tier]>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>, EngineError> {
        let tiers = match tiers {
            Some(requested) => {
                if requested.contains(&Tier::Working) {
                    return Err(EngineError::Validation(
                        "working events are session-scoped and not searchable".into(),
                    ));
                }
                let mut unique: Vec<Tier> = Vec::new();
                for tier in requested {
                    if !unique.contains(tier) {
                        unique.push(*tier);
                    }
                }
                unique
            }
            None => vec![Tier::Episodic, Tier::Canonical],
        };
        let limit = limit.unwrap_or(self.config.default_limit);

        let now = Timestamp::now();
        let active = RecordFilter::new().with_state(LifecycleState::Active);
        let mut scored: Vec<(f64, MemoryRecord)> = Vec::new();
        for tier in tiers {
            for record in self.store.query(tier, &active).await? {
                let similarity = self
                    .scorer
                    .similarity(query, &record.content)
                    .await
                    .clamp(0.0, 1.0);
                let score = similarity * self.config.decay.weight(record.created_at.age_ms(now));
                if score > 0.0 {
                    scored.push((score, record));
                }
            }
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, record)| self.package(score, record, view))
            .collect())
    }

    fn package(&self, score: f64, record: MemoryRecord, view: SearchView) -> SearchResult {
        let (id, tier) = (record.id, record.tier());
        let view = match view {
            SearchView::Index => ResultView::Index {
                excerpt: excerpt(&record.content, self.config.excerpt_chars),
            },
            SearchView::Detail => ResultView::Detail { record },
        };
        SearchResult {
            id,
            tier,
            score,
            view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::TokenOverlapScorer;
    use strata_store::InMemoryStore;
    use strata_types::{NodeKind, TierData};

    fn searcher_with(config: SearchConfig) -> (Searcher, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let searcher = Searcher::new(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::new(TokenOverlapScorer),
            config,
        );
        (searcher, store)
    }

    fn no_decay() -> SearchConfig {
        SearchConfig {
            decay: DecayCurve::None,
            ..SearchConfig::default()
        }
    }

    async fn put_node(store: &InMemoryStore, content: &str, created: Timestamp) -> RecordId {
        let record = MemoryRecord::builder(
            content,
            TierData::Canonical {
                kind: NodeKind::Fact,
                confidence: 0.9,
                deprecated_reason: None,
                superseded_by: None,
                source_ref: None,
            },
        )
        .created_at(created)
        .build();
        store.put(record).await.unwrap()
    }

    async fn put_episode(store: &InMemoryStore, content: &str, created: Timestamp) -> RecordId {
        let record = MemoryRecord::builder(
            content,
            TierData::Episode {
                session_id: "s1".into(),
                covers: vec![],
            },
        )
        .created_at(created)
        .build();
        store.put(record).await.unwrap()
    }

    #[test]
    fn exponential_decay_halves_at_half_life() {
        let curve = DecayCurve::Exponential {
            half_life: Duration::from_millis(1_000),
        };
        assert!((curve.weight(0) - 1.0).abs() < 1e-9);
        assert!((curve.weight(1_000) - 0.5).abs() < 1e-9);
        assert!((curve.weight(2_000) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn linear_decay_bottoms_out_at_zero() {
        let curve = DecayCurve::Linear {
            window: Duration::from_millis(1_000),
        };
        assert!((curve.weight(0) - 1.0).abs() < 1e-9);
        assert!((curve.weight(500) - 0.5).abs() < 1e-9);
        assert_eq!(curve.weight(1_000), 0.0);
        assert_eq!(curve.weight(5_000), 0.0);
    }

    #[test]
    fn decay_weights_never_increase_with_age() {
        let curves = [
            DecayCurve::None,
            DecayCurve::Exponential {
                half_life: Duration::from_millis(500),
            },
            DecayCurve::Linear {
                window: Duration::from_millis(2_000),
            },
        ];
        for curve in curves {
            let mut prev = curve.weight(0);
            for age in [1u64, 10, 100, 1_000, 10_000] {
                let next = curve.weight(age);
                assert!(next <= prev, "weight rose with age for {curve:?}");
                assert!((0.0..=1.0).contains(&next));
                prev = next;
            }
        }
    }

    #[tokio::test]
    async fn ranks_by_similarity() {
        let (searcher, store) = searcher_with(no_decay());
        let relevant = put_node(&store, "rust ownership rules", Timestamp::new(1_000, 0)).await;
        let partial = put_node(&store, "rust release schedule", Timestamp::new(1_000, 1)).await;
        let _noise = put_node(&store, "lunch menu for tuesday", Timestamp::new(1_000, 2)).await;

        let results = searcher
            .search("ownership rust", SearchView::Index, None, None)
            .await
            .unwrap();
        // The zero-overlap record does not appear at all.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, relevant);
        assert_eq!(results[1].id, partial);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn recency_discounts_older_records() {
        let (searcher, store) = searcher_with(SearchConfig {
            decay: DecayCurve::Exponential {
                half_life: Duration::from_secs(3_600),
            },
            ..SearchConfig::default()
        });
        let now = Timestamp::now();
        let old = put_node(
            &store,
            "deploy checklist",
            Timestamp::new(now.physical_ms.saturating_sub(48 * 3_600 * 1_000), 0),
        )
        .await;
        let fresh = put_node(&store, "deploy checklist", now).await;

        let results = searcher
            .search("deploy checklist", SearchView::Index, None, None)
            .await
            .unwrap();
        assert_eq!(results[0].id, fresh);
        assert_eq!(results[1].id, old);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn score_ties_break_toward_newer() {
        let (searcher, store) = searcher_with(no_decay());
        let older = put_node(&store, "same words here", Timestamp::new(1_000, 0)).await;
        let newer = put_node(&store, "same words here", Timestamp::new(2_000, 0)).await;

        let results = searcher
            .search("same words", SearchView::Index, None, None)
            .await
            .unwrap();
        assert_eq!(results[0].id, newer);
        assert_eq!(results[1].id, older);
    }

    #[tokio::test]
    async fn only_active_records_match() {
        let (searcher, store) = searcher_with(no_decay());
        let keep = put_node(&store, "topic alpha", Timestamp::new(1_000, 0)).await;
        let hide = put_node(&store, "topic alpha", Timestamp::new(1_000, 1)).await;
        let mut record = store.get(&hide).await.unwrap().unwrap();
        record.state = LifecycleState::Deprecated;
        store.put(record).await.unwrap();

        let results = searcher
            .search("topic alpha", SearchView::Index, None, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, keep);
    }

    #[tokio::test]
    async fn tier_filter_narrows_scope() {
        let (searcher, store) = searcher_with(no_decay());
        let node = put_node(&store, "shared topic", Timestamp::new(1_000, 0)).await;
        let episode = put_episode(&store, "shared topic", Timestamp::new(1_000, 1)).await;

        let results = searcher
            .search(
                "shared topic",
                SearchView::Index,
                Some(&[Tier::Canonical]),
                None,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, node);

        let results = searcher
            .search(
                "shared topic",
                SearchView::Index,
                Some(&[Tier::Episodic]),
                None,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, episode);
    }

    #[tokio::test]
    async fn working_tier_is_not_searchable() {
        let (searcher, _store) = searcher_with(no_decay());
        let err = searcher
            .search("anything", SearchView::Index, Some(&[Tier::Working]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_store_returns_empty_not_error() {
        let (searcher, _store) = searcher_with(no_decay());
        let results = searcher
            .search("anything", SearchView::Index, None, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn limit_truncates_after_ranking() {
        let (searcher, store) = searcher_with(no_decay());
        for i in 0..5 {
            put_node(&store, "common topic", Timestamp::new(1_000 + i, 0)).await;
        }
        let results = searcher
            .search("common topic", SearchView::Index, None, Some(2))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        // Newest two, since scores tie.
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn index_view_bounds_excerpt() {
        let (searcher, store) = searcher_with(SearchConfig {
            decay: DecayCurve::None,
            excerpt_chars: 10,
            default_limit: 10,
        });
        put_node(
            &store,
            "a very long canonical statement about something",
            Timestamp::new(1_000, 0),
        )
        .await;

        let results = searcher
            .search("canonical statement", SearchView::Index, None, None)
            .await
            .unwrap();
        match &results[0].view {
            ResultView::Index { excerpt } => assert_eq!(excerpt, "a very lon"),
            other => panic!("unexpected view: {other:?}"),
        }
    }

    #[tokio::test]
    async fn detail_view_carries_full_record() {
        let (searcher, store) = searcher_with(no_decay());
        let id = put_node(&store, "full record please", Timestamp::new(1_000, 0)).await;

        let results = searcher
            .search("record", SearchView::Detail, None, None)
            .await
            .unwrap();
        match &results[0].view {
            ResultView::Detail { record } => {
                assert_eq!(record.id, id);
                assert_eq!(record.content, "full record please");
            }
            other => panic!("unexpected view: {other:?}"),
        }
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo wörld", 5), "héllo");
        assert_eq!(excerpt("short", 100), "short");
    }

    #[tokio::test]
    async fn results_serialize_roundtrip() {
        let (searcher, store) = searcher_with(no_decay());
        put_node(&store, "serializable fact", Timestamp::new(1_000, 0)).await;

        let results = searcher
            .search("serializable fact", SearchView::Detail, None, None)
            .await
            .unwrap();
        let json = serde_json::to_string(&results).unwrap();
        let restored: Vec<SearchResult> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id, results[0].id);
        match &restored[0].view {
            ResultView::Detail { record } => assert_eq!(record.content, "serializable fact"),
            other => panic!("unexpected view: {other:?}"),
        }
    }
}

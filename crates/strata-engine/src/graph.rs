//! Typed relation graph over canonical nodes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use strata_store::{RecordStore, StoreError};
use strata_types::{LifecycleState, Link, MemoryRecord, RecordId, Tier};
use tracing::debug;

use crate::error::EngineError;

/// A node reached during expansion, paired with the edge that first
/// reached it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expansion {
    pub node: MemoryRecord,
    pub via: Link,
}

/// Adjacency over canonical node ids. Links belong to the graph, not to
/// either endpoint; forgetting a node strips every link touching it.
///
/// The graph tracks structure only. Whether an edge may be followed
/// during traversal depends on the target's lifecycle state, which lives
/// in the record store.
#[derive(Clone, Default)]
pub(crate) struct RelationGraph {
    inner: Arc<RwLock<Adjacency>>,
}

#[derive(Default)]
struct Adjacency {
    out: HashMap<RecordId, Vec<Link>>,
    /// Reverse index: for each target, the sources pointing at it. Needed
    /// so incident-link removal does not scan the whole graph.
    incoming: HashMap<RecordId, HashSet<RecordId>>,
    links: usize,
}

fn lock_poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("relation graph lock poisoned".into())
}

impl RelationGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert an edge. Returns false when the identical
    /// (from, to, relation) triple already exists.
    pub(crate) fn insert(&self, link: Link) -> Result<bool, StoreError> {
        let mut adj = self.inner.write().map_err(lock_poisoned)?;
        if let Some(edges) = adj.out.get(&link.from_id) {
            if edges
                .iter()
                .any(|l| l.same_edge(link.from_id, link.to_id, &link.relation_type))
            {
                return Ok(false);
            }
        }
        adj.incoming
            .entry(link.to_id)
            .or_default()
            .insert(link.from_id);
        let from_id = link.from_id;
        adj.out.entry(from_id).or_default().push(link);
        adj.links += 1;
        Ok(true)
    }

    /// Remove one edge. Returns false when no such edge exists.
    pub(crate) fn remove(
        &self,
        from: RecordId,
        to: RecordId,
        relation: &str,
    ) -> Result<bool, StoreError> {
        let mut adj = self.inner.write().map_err(lock_poisoned)?;
        let Some(edges) = adj.out.get_mut(&from) else {
            return Ok(false);
        };
        let before = edges.len();
        edges.retain(|l| !l.same_edge(from, to, relation));
        let removed = before - edges.len();
        if removed == 0 {
            return Ok(false);
        }
        let still_pointing = edges.iter().any(|l| l.to_id == to);
        if edges.is_empty() {
            adj.out.remove(&from);
        }
        if !still_pointing {
            if let Some(sources) = adj.incoming.get_mut(&to) {
                sources.remove(&from);
                if sources.is_empty() {
                    adj.incoming.remove(&to);
                }
            }
        }
        adj.links -= removed;
        Ok(true)
    }

    /// Remove every link touching `id`, in both directions. Returns how
    /// many links were removed.
    pub(crate) fn remove_incident(&self, id: RecordId) -> Result<usize, StoreError> {
        let mut adj = self.inner.write().map_err(lock_poisoned)?;
        let mut removed = 0;

        if let Some(edges) = adj.out.remove(&id) {
            removed += edges.len();
            for link in &edges {
                if let Some(sources) = adj.incoming.get_mut(&link.to_id) {
                    sources.remove(&id);
                    if sources.is_empty() {
                        adj.incoming.remove(&link.to_id);
                    }
                }
            }
        }

        if let Some(sources) = adj.incoming.remove(&id) {
            for source in sources {
                let emptied = if let Some(edges) = adj.out.get_mut(&source) {
                    let before = edges.len();
                    edges.retain(|l| l.to_id != id);
                    removed += before - edges.len();
                    edges.is_empty()
                } else {
                    false
                };
                if emptied {
                    adj.out.remove(&source);
                }
            }
        }

        adj.links -= removed;
        if removed > 0 {
            debug!(id = %id, removed, "removed incident links");
        }
        Ok(removed)
    }

    /// Outgoing edges of `id`, in insertion order.
    pub(crate) fn out_edges(&self, id: RecordId) -> Result<Vec<Link>, StoreError> {
        let adj = self.inner.read().map_err(lock_poisoned)?;
        Ok(adj.out.get(&id).cloned().unwrap_or_default())
    }

    pub(crate) fn link_count(&self) -> Result<usize, StoreError> {
        let adj = self.inner.read().map_err(lock_poisoned)?;
        Ok(adj.links)
    }

    /// Breadth-first neighborhood of `seed_id`, bounded by `depth` hops.
    ///
    /// Each reachable node appears at most once, paired with the edge
    /// that first discovered it; cycles terminate through the visited
    /// set. Deprecated nodes are returned but their outgoing edges are
    /// not followed, forgotten nodes are invisible, and edges whose
    /// target has been purged from the store are skipped. The seed's own
    /// edges are always followed, so expanding a deprecated node still
    /// shows what it connects to.
    pub(crate) async fn expand(
        &self,
        store: &dyn RecordStore,
        seed_id: RecordId,
        depth: usize,
        relation_filter: Option<&[String]>,
    ) -> Result<Vec<Expansion>, EngineError> {
        match store.get(&seed_id).await? {
            Some(record)
                if record.tier() == Tier::Canonical
                    && record.state != LifecycleState::Forgotten => {}
            _ => return Err(EngineError::NotFound(seed_id.to_string())),
        }

        let mut visited: HashSet<RecordId> = HashSet::from([seed_id]);
        let mut results = Vec::new();
        let mut frontier: VecDeque<(RecordId, usize)> = VecDeque::from([(seed_id, 0)]);

        while let Some((id, hops)) = frontier.pop_front() {
            if hops >= depth {
                continue;
            }
            for link in self.out_edges(id)? {
                if let Some(filter) = relation_filter {
                    if !filter.iter().any(|r| *r == link.relation_type) {
                        continue;
                    }
                }
                if visited.contains(&link.to_id) {
                    continue;
                }
                let Some(node) = store.get(&link.to_id).await? else {
                    continue;
                };
                if node.state == LifecycleState::Forgotten {
                    continue;
                }
                let to_id = link.to_id;
                let traversable = node.is_active();
                visited.insert(to_id);
                results.push(Expansion { node, via: link });
                if traversable {
                    frontier.push_back((to_id, hops + 1));
                }
            }
        }
        Ok(results)
    }
}

//! In-memory provider implementation.
//!
//! Mirrors the merge semantics of the Neo4j statements: nodes keyed by
//! (label, assetId), edges keyed by (label, source, target, type), one
//! commit per batch call. State lives behind an `Arc` owned by the connector,
//! so it survives across sessions the way a real database would.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cypher::CypherIdent;
use crate::errors::GraphStoreError;
use crate::interfaces::{GraphStore, GraphStoreConnector};
use crate::types::{
    ConstraintKind, ConstraintSpec, Direction, EdgeBatchOutcome, EdgeMerge, IndexSpec,
    NeighborQuery, NodeBatchOutcome, NodeUpsert, PropertyMap, RelatedNode, ASSET_ID_PROPERTY,
    INTERNAL_ASSET_ID_PROPERTY,
};

/// A stored node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryNode {
    pub labels: BTreeSet<String>,
    pub properties: PropertyMap,
}

/// Identity of a stored edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub label: String,
    pub source: String,
    pub target: String,
    pub relationship_type: String,
}

impl EdgeKey {
    pub fn new(label: &str, source: &str, target: &str, relationship_type: &str) -> Self {
        Self {
            label: label.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            relationship_type: relationship_type.to_string(),
        }
    }
}

/// Failures the in-memory store should simulate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// `connect` fails with a connection error.
    pub unreachable: bool,
    /// `ensure_constraint` fails with a constraint rejection.
    pub reject_constraints: bool,
    /// Once this many batches have committed, further batches fail transiently.
    pub fail_after_batches: Option<usize>,
}

/// Point-in-time copy of the in-memory graph.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub nodes: BTreeMap<(String, String), MemoryNode>,
    pub edges: BTreeMap<EdgeKey, PropertyMap>,
    pub constraints: BTreeSet<String>,
    pub indexes: BTreeSet<String>,
    pub committed_batches: usize,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
}

impl GraphSnapshot {
    pub fn node(&self, label: &str, asset_id: &str) -> Option<&MemoryNode> {
        self.nodes.get(&(label.to_string(), asset_id.to_string()))
    }

    pub fn node_count(&self, label: &str) -> usize {
        self.nodes.keys().filter(|(l, _)| l == label).count()
    }

    pub fn edge(
        &self,
        label: &str,
        source: &str,
        target: &str,
        relationship_type: &str,
    ) -> Option<&PropertyMap> {
        self.edges
            .get(&EdgeKey::new(label, source, target, relationship_type))
    }

    pub fn edge_count(&self, label: &str) -> usize {
        self.edges.keys().filter(|k| k.label == label).count()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    graph: GraphSnapshot,
    faults: FaultPlan,
}

impl MemoryState {
    fn begin_batch(&self) -> Result<(), GraphStoreError> {
        if let Some(limit) = self.faults.fail_after_batches {
            if self.graph.committed_batches >= limit {
                return Err(GraphStoreError::transient(format!(
                    "simulated outage after {} committed batches",
                    limit
                )));
            }
        }
        Ok(())
    }
}

/// Opens sessions over one shared in-memory graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                graph: GraphSnapshot::default(),
                faults,
            })),
        }
    }

    /// Replace the fault plan, e.g. to let a restarted run succeed.
    pub async fn set_faults(&self, faults: FaultPlan) {
        self.state.lock().await.faults = faults;
    }

    pub async fn snapshot(&self) -> GraphSnapshot {
        self.state.lock().await.graph.clone()
    }
}

#[async_trait]
impl GraphStoreConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn GraphStore>, GraphStoreError> {
        let mut state = self.state.lock().await;
        if state.faults.unreachable {
            return Err(GraphStoreError::connection("simulated unreachable store"));
        }
        state.graph.sessions_opened += 1;
        Ok(Box::new(InMemoryGraphStore {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Graph store session over a [`MemoryConnector`]'s graph.
pub struct InMemoryGraphStore {
    state: Arc<Mutex<MemoryState>>,
    closed: AtomicBool,
}

impl InMemoryGraphStore {
    fn ensure_open(&self) -> Result<(), GraphStoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GraphStoreError::Closed);
        }
        Ok(())
    }
}

/// One hop available from a node during traversal.
struct Hop<'a> {
    key: &'a EdgeKey,
    next: &'a str,
}

fn hops_from<'a>(
    graph: &'a GraphSnapshot,
    label: &str,
    from: &str,
    direction: Direction,
) -> Vec<Hop<'a>> {
    let mut hops = Vec::new();
    for key in graph.edges.keys().filter(|k| k.label == label) {
        let outgoing = key.source == from;
        let incoming = key.target == from;
        match direction {
            Direction::Outgoing if outgoing => hops.push(Hop {
                key,
                next: &key.target,
            }),
            Direction::Incoming if incoming => hops.push(Hop {
                key,
                next: &key.source,
            }),
            Direction::Both => {
                if outgoing {
                    hops.push(Hop {
                        key,
                        next: &key.target,
                    });
                }
                if incoming && !outgoing {
                    hops.push(Hop {
                        key,
                        next: &key.source,
                    });
                }
            }
            _ => {}
        }
    }
    hops
}

struct Traversal<'a> {
    graph: &'a GraphSnapshot,
    query: &'a NeighborQuery,
    used: HashSet<&'a EdgeKey>,
    found: Vec<RelatedNode>,
}

impl<'a> Traversal<'a> {
    /// Depth-first walk; a relationship is used at most once per path.
    fn walk(&mut self, from: &'a str, depth: u32) {
        let graph = self.graph;
        let query = self.query;
        let label = query.label.as_str();
        for hop in hops_from(graph, label, from, query.direction) {
            if self.found.len() >= query.limit {
                return;
            }
            if self.used.contains(hop.key) {
                continue;
            }
            if !query.relationship_types.is_empty()
                && !query
                    .relationship_types
                    .iter()
                    .any(|t| t == &hop.key.relationship_type)
            {
                continue;
            }
            let Some(node) = graph
                .nodes
                .get(&(label.to_string(), hop.next.to_string()))
            else {
                continue;
            };

            self.found.push(RelatedNode {
                asset_id: hop.next.to_string(),
                depth: depth + 1,
                relationship_type: hop.key.relationship_type.clone(),
                properties: node.properties.clone(),
            });

            if depth + 1 < query.max_depth.max(1) {
                self.used.insert(hop.key);
                self.walk(hop.next, depth + 1);
                self.used.remove(hop.key);
            }
        }
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn verify_connectivity(&self) -> Result<(), GraphStoreError> {
        self.ensure_open()
    }

    async fn ensure_constraint(&self, spec: &ConstraintSpec) -> Result<(), GraphStoreError> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        if state.faults.reject_constraints {
            return Err(GraphStoreError::constraint_rejected(format!(
                "simulated rejection of {}",
                spec.name()
            )));
        }

        if spec.kind == ConstraintKind::NodeKey {
            let label = spec.label.as_str();
            let missing = state
                .graph
                .nodes
                .iter()
                .filter(|((l, _), _)| l == label)
                .find(|(_, node)| {
                    spec.mode
                        .key_properties()
                        .iter()
                        .any(|p| !node.properties.contains_key(*p))
                });
            if let Some(((_, asset_id), _)) = missing {
                return Err(GraphStoreError::constraint_rejected(format!(
                    "node {} lacks a key property required by {}",
                    asset_id,
                    spec.name()
                )));
            }
        }

        state.graph.constraints.insert(spec.name());
        Ok(())
    }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), GraphStoreError> {
        self.ensure_open()?;
        self.state.lock().await.graph.indexes.insert(spec.name());
        Ok(())
    }

    async fn upsert_nodes(
        &self,
        label: &CypherIdent,
        nodes: &[NodeUpsert],
        secondary_labels: bool,
    ) -> Result<NodeBatchOutcome, GraphStoreError> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        state.begin_batch()?;

        let mut outcome = NodeBatchOutcome::default();
        for upsert in nodes {
            let key = (label.as_str().to_string(), upsert.asset_id.clone());
            let node = state.graph.nodes.entry(key).or_insert_with(|| {
                outcome.created += 1;
                let mut node = MemoryNode::default();
                node.labels.insert(label.as_str().to_string());
                node.properties
                    .insert(ASSET_ID_PROPERTY.to_string(), upsert.asset_id.clone());
                node.properties.insert(
                    INTERNAL_ASSET_ID_PROPERTY.to_string(),
                    upsert.internal_asset_id.clone(),
                );
                node
            });
            if node.properties.get(INTERNAL_ASSET_ID_PROPERTY) != Some(&upsert.internal_asset_id)
            {
                outcome.updated += 1;
            }
            for (name, value) in &upsert.attributes {
                node.properties.insert(name.clone(), value.clone());
            }
            if secondary_labels {
                if let Some(extra) = &upsert.secondary_label {
                    node.labels.insert(extra.as_str().to_string());
                }
            }
        }

        state.graph.committed_batches += 1;
        debug!(
            created = outcome.created,
            updated = outcome.updated,
            "Committed in-memory node batch"
        );
        Ok(outcome)
    }

    async fn merge_edges(
        &self,
        label: &CypherIdent,
        edges: &[EdgeMerge],
    ) -> Result<EdgeBatchOutcome, GraphStoreError> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        state.begin_batch()?;

        let label = label.as_str();
        let mut outcome = EdgeBatchOutcome::default();
        for edge in edges {
            let resolved = [&edge.source_asset_id, &edge.target_asset_id]
                .iter()
                .all(|id| {
                    state
                        .graph
                        .nodes
                        .contains_key(&(label.to_string(), id.to_string()))
                });
            if !resolved {
                outcome.unresolved += 1;
                continue;
            }
            let key = EdgeKey::new(
                label,
                &edge.source_asset_id,
                &edge.target_asset_id,
                edge.relationship_type.as_str(),
            );
            state.graph.edges.insert(key, edge.attributes.clone());
            outcome.merged += 1;
        }

        state.graph.committed_batches += 1;
        Ok(outcome)
    }

    async fn related_nodes(
        &self,
        query: &NeighborQuery,
    ) -> Result<Vec<RelatedNode>, GraphStoreError> {
        self.ensure_open()?;
        let state = self.state.lock().await;
        let start = (query.label.as_str().to_string(), query.asset_id.clone());
        if !state.graph.nodes.contains_key(&start) || query.limit == 0 {
            return Ok(Vec::new());
        }

        let mut traversal = Traversal {
            graph: &state.graph,
            query,
            used: HashSet::new(),
            found: Vec::new(),
        };
        traversal.walk(&query.asset_id, 0);
        Ok(traversal.found)
    }

    async fn close(&self) -> Result<(), GraphStoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.state.lock().await.graph.sessions_closed += 1;
        }
        Ok(())
    }
}

//! Request and outcome types for graph store operations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cypher::CypherIdent;

/// Property carrying the stable external asset identifier.
pub const ASSET_ID_PROPERTY: &str = "assetId";

/// Property carrying the store-internal identifier stamped on node creation.
pub const INTERNAL_ASSET_ID_PROPERTY: &str = "internalAssetId";

/// Flat property map. Every value written by the loader is a string.
pub type PropertyMap = HashMap<String, String>;

/// Which attributes make up the node uniqueness invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UniquenessMode {
    /// `assetId` alone.
    #[default]
    Single,
    /// The pair `internalAssetId` + `assetId`.
    Composite,
}

impl UniquenessMode {
    /// Key properties, in declaration order.
    pub fn key_properties(&self) -> &'static [&'static str] {
        match self {
            UniquenessMode::Single => &[ASSET_ID_PROPERTY],
            UniquenessMode::Composite => &[INTERNAL_ASSET_ID_PROPERTY, ASSET_ID_PROPERTY],
        }
    }
}

/// How the uniqueness invariant is expressed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstraintKind {
    /// Properties must exist and be unique together.
    #[default]
    NodeKey,
    /// Properties must be unique together when present.
    Unique,
}

/// Uniqueness constraint over one node label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSpec {
    pub label: CypherIdent,
    pub mode: UniquenessMode,
    pub kind: ConstraintKind,
}

impl ConstraintSpec {
    pub fn new(label: CypherIdent, mode: UniquenessMode, kind: ConstraintKind) -> Self {
        Self { label, mode, kind }
    }

    /// Stable constraint name, so repeated declarations hit `IF NOT EXISTS`.
    /// The kind is part of the name so switching kinds declares a new constraint.
    pub fn name(&self) -> String {
        let mode = match self.mode {
            UniquenessMode::Single => "single",
            UniquenessMode::Composite => "composite",
        };
        let kind = match self.kind {
            ConstraintKind::NodeKey => "node_key",
            ConstraintKind::Unique => "unique",
        };
        format!("{}_{}_{}", self.label.name_fragment(), mode, kind)
    }
}

/// Range index over one node property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub label: CypherIdent,
    pub property: CypherIdent,
}

impl IndexSpec {
    pub fn new(label: CypherIdent, property: CypherIdent) -> Self {
        Self { label, property }
    }

    pub fn name(&self) -> String {
        format!(
            "{}_{}_index",
            self.label.name_fragment(),
            self.property.name_fragment()
        )
    }
}

/// One node to merge by `assetId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpsert {
    pub asset_id: String,
    /// Applied only when the merge creates the node.
    pub internal_asset_id: String,
    /// Extra label added to the node, taken from the device type.
    pub secondary_label: Option<CypherIdent>,
    /// Canonical attributes, overwritten on every merge.
    pub attributes: PropertyMap,
}

/// One directed edge to merge between two existing nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMerge {
    pub source_asset_id: String,
    pub target_asset_id: String,
    pub relationship_type: CypherIdent,
    /// Replaces the edge's attributes entirely.
    pub attributes: PropertyMap,
}

/// Result of committing one node batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeBatchOutcome {
    pub created: usize,
    pub updated: usize,
}

impl NodeBatchOutcome {
    pub fn upserted(&self) -> usize {
        self.created + self.updated
    }
}

/// Result of committing one edge batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EdgeBatchOutcome {
    /// Rows that created or refreshed an edge.
    pub merged: usize,
    /// Rows whose source or target node does not exist.
    pub unresolved: usize,
}

/// Traversal direction relative to the start node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    #[default]
    Both,
}

impl Direction {
    /// Anything other than `incoming` or `outgoing` means both directions.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "incoming" => Direction::Incoming,
            "outgoing" => Direction::Outgoing,
            _ => Direction::Both,
        }
    }
}

/// Query for nodes reachable from one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborQuery {
    pub label: CypherIdent,
    pub asset_id: String,
    pub direction: Direction,
    /// Maximum path length, at least 1.
    pub max_depth: u32,
    /// When non-empty, every relationship on the path must have one of these types.
    pub relationship_types: Vec<String>,
    pub limit: usize,
}

/// One path end returned by a neighbour query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedNode {
    pub asset_id: String,
    /// Length of the path that reached this node.
    pub depth: u32,
    /// Type of the last relationship on the path.
    pub relationship_type: String,
    pub properties: PropertyMap,
}

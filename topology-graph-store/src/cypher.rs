//! Cypher statement construction.
//!
//! Statement shape is fixed here; every data value is bound as a parameter.
//! Labels and relationship types cannot be parameters in Cypher, so they are
//! carried as [`CypherIdent`], which only ever reaches statement text in its
//! backtick-quoted form.

use std::fmt;

use crate::errors::GraphStoreError;
use crate::types::{
    ConstraintKind, ConstraintSpec, Direction, IndexSpec, NeighborQuery, ASSET_ID_PROPERTY,
    INTERNAL_ASSET_ID_PROPERTY,
};

/// Longest identifier Neo4j accepts.
pub const MAX_IDENTIFIER_CHARS: usize = 16_383;

/// Statement used to check that a session can reach the store.
pub const CONNECTIVITY_CHECK: &str = "RETURN 'Connection Successful' AS message";

/// A validated label, relationship type or property name.
///
/// The raw name is kept verbatim so that the store sees exactly what the input
/// data said. Validation rejects names that are blank, contain control
/// characters or exceed the store's identifier length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CypherIdent(String);

impl CypherIdent {
    pub fn new(raw: impl Into<String>) -> Result<Self, GraphStoreError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(GraphStoreError::invalid_identifier(raw, "must not be blank"));
        }
        if raw.chars().any(char::is_control) {
            return Err(GraphStoreError::invalid_identifier(
                raw,
                "must not contain control characters",
            ));
        }
        if raw.chars().count() > MAX_IDENTIFIER_CHARS {
            return Err(GraphStoreError::invalid_identifier(
                raw,
                format!("must not exceed {} characters", MAX_IDENTIFIER_CHARS),
            ));
        }
        Ok(Self(raw))
    }

    /// The name as supplied.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as it may appear in statement text.
    pub fn quoted(&self) -> String {
        format!("`{}`", self.0.replace('`', "``"))
    }

    /// Lossy `[A-Za-z0-9_]` form, used to derive schema object names.
    pub fn name_fragment(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for CypherIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

fn property_ref(var: &str, property: &str) -> String {
    format!("{}.`{}`", var, property.replace('`', "``"))
}

/// `CREATE CONSTRAINT ... IF NOT EXISTS` for the node uniqueness invariant.
pub fn constraint_statement(spec: &ConstraintSpec) -> String {
    let properties = spec
        .mode
        .key_properties()
        .iter()
        .map(|p| property_ref("n", p))
        .collect::<Vec<_>>()
        .join(", ");
    let requirement = match spec.kind {
        ConstraintKind::NodeKey => "IS NODE KEY",
        ConstraintKind::Unique => "IS UNIQUE",
    };
    format!(
        "CREATE CONSTRAINT `{}` IF NOT EXISTS FOR (n:{}) REQUIRE ({}) {}",
        spec.name(),
        spec.label,
        properties,
        requirement
    )
}

/// `CREATE INDEX ... IF NOT EXISTS` over one node property.
pub fn index_statement(spec: &IndexSpec) -> String {
    format!(
        "CREATE INDEX `{}` IF NOT EXISTS FOR (n:{}) ON ({})",
        spec.name(),
        spec.label,
        property_ref("n", spec.property.as_str())
    )
}

/// Batched node merge.
///
/// Parameters: `$rows`, a list of maps with `assetId`, `internalAssetId`,
/// `labels` (list of strings) and `attributes` (map). Returns one row with
/// `created` and `upserted` counts. A node counts as created when its stored
/// internal identifier is the one this row proposed.
pub fn node_upsert_statement(label: &CypherIdent, secondary_labels: bool) -> String {
    let mut statement = format!(
        "UNWIND $rows AS row \
         MERGE (n:{label} {{{asset}: row.assetId}}) \
         ON CREATE SET {internal} = row.internalAssetId \
         SET n += row.attributes ",
        label = label,
        asset = ASSET_ID_PROPERTY,
        internal = property_ref("n", INTERNAL_ASSET_ID_PROPERTY),
    );
    if secondary_labels {
        statement.push_str(
            "WITH n, row \
             CALL apoc.create.addLabels(n, row.labels) YIELD node ",
        );
    }
    statement.push_str(&format!(
        "RETURN sum(CASE WHEN {internal} = row.internalAssetId THEN 1 ELSE 0 END) AS created, \
         count(*) AS upserted",
        internal = property_ref("n", INTERNAL_ASSET_ID_PROPERTY),
    ));
    statement
}

/// Batched edge merge for a single relationship type.
///
/// Parameters: `$rows`, a list of maps with `source`, `target` and
/// `attributes`. Rows whose endpoints do not both exist produce no output, so
/// the returned `merged` count is the number of rows that reached an edge.
pub fn edge_merge_statement(label: &CypherIdent, relationship_type: &CypherIdent) -> String {
    format!(
        "UNWIND $rows AS row \
         MATCH (source:{label} {{{asset}: row.source}}) \
         MATCH (target:{label} {{{asset}: row.target}}) \
         MERGE (source)-[r:{rel}]->(target) \
         SET r = row.attributes \
         RETURN count(r) AS merged",
        label = label,
        asset = ASSET_ID_PROPERTY,
        rel = relationship_type,
    )
}

/// Variable-length neighbour lookup.
///
/// Parameters: `$assetId`, `$types` (list, empty for any type), `$limit`.
pub fn related_nodes_statement(query: &NeighborQuery) -> String {
    let hops = format!("[*1..{}]", query.max_depth.max(1));
    let pattern = match query.direction {
        Direction::Outgoing => format!("-{}->", hops),
        Direction::Incoming => format!("<-{}-", hops),
        Direction::Both => format!("-{}-", hops),
    };
    format!(
        "MATCH p = (start:{label} {{{asset}: $assetId}}){pattern}(related:{label}) \
         WITH related, relationships(p) AS rels \
         WHERE size($types) = 0 OR all(rel IN rels WHERE type(rel) IN $types) \
         WITH related, rels \
         LIMIT $limit \
         RETURN related.{asset} AS assetId, size(rels) AS depth, \
         type(rels[size(rels) - 1]) AS relationshipType, properties(related) AS properties",
        label = query.label,
        asset = ASSET_ID_PROPERTY,
        pattern = pattern,
    )
}

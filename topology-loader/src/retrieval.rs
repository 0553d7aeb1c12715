//! Neighbour lookups over a loaded topology.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use topology_graph_store::{
    CypherIdent, Direction, GraphStoreConnector, NeighborQuery, RelatedNode,
};

use crate::errors::{ConfigError, LoaderError};

/// Path length used when none is given.
pub const DEFAULT_LEVELS: u32 = 1;
/// Result cap used when none is given.
pub const DEFAULT_LIMIT: usize = 500;

/// One traversal of a multi-relation lookup.
///
/// Parses from `TYPE[:levels[:direction]]` or deserializes from
/// `{"relation": .., "relationLevel": .., "direction": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSpec {
    pub relation: String,
    #[serde(default = "default_levels")]
    pub relation_level: u32,
    #[serde(default)]
    pub direction: Direction,
}

fn default_levels() -> u32 {
    DEFAULT_LEVELS
}

impl FromStr for RelationSpec {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.split(':');
        let relation = parts.next().unwrap_or_default().trim();
        if relation.is_empty() {
            return Err(ConfigError::invalid("relation", "relationship type is empty"));
        }
        let relation_level = match parts.next().map(str::trim) {
            Some(levels) if !levels.is_empty() => match levels.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::invalid(
                        "relation",
                        format!("levels must be a positive integer, got {}", levels),
                    ))
                }
            },
            _ => DEFAULT_LEVELS,
        };
        let direction = parts.next().map(Direction::parse_lenient).unwrap_or_default();
        Ok(Self {
            relation: relation.to_string(),
            relation_level,
            direction,
        })
    }
}

/// Runs related-node queries, one store session per call.
pub struct NeighborRetriever {
    connector: Arc<dyn GraphStoreConnector>,
    label: CypherIdent,
}

impl NeighborRetriever {
    pub fn new(connector: Arc<dyn GraphStoreConnector>, label: CypherIdent) -> Self {
        Self { connector, label }
    }

    /// Build a query for `asset_id` under this retriever's label.
    pub fn query(&self, asset_id: impl Into<String>) -> NeighborQuery {
        NeighborQuery {
            label: self.label.clone(),
            asset_id: asset_id.into(),
            direction: Direction::Both,
            max_depth: DEFAULT_LEVELS,
            relationship_types: Vec::new(),
            limit: DEFAULT_LIMIT,
        }
    }

    /// Nodes reachable from the query's start asset.
    ///
    /// An unknown asset yields an empty list.
    pub async fn related(&self, query: &NeighborQuery) -> Result<Vec<RelatedNode>, LoaderError> {
        let store = self.connector.connect().await?;
        let result = store.related_nodes(query).await;
        if let Err(e) = store.close().await {
            warn!(error = %e, "Failed to close graph store session");
        }
        let related = result?;
        debug!(
            asset_id = %query.asset_id,
            direction = ?query.direction,
            max_depth = query.max_depth,
            found = related.len(),
            "Related nodes retrieved"
        );
        Ok(related)
    }

    /// Run one traversal per spec from `asset_id` and concatenate the results
    /// in spec order. Each traversal is capped at `limit` on its own.
    pub async fn related_by_relations(
        &self,
        asset_id: &str,
        specs: &[RelationSpec],
        limit: usize,
    ) -> Result<Vec<RelatedNode>, LoaderError> {
        let store = self.connector.connect().await?;
        let mut related = Vec::new();
        let mut outcome = Ok(());
        for spec in specs {
            let query = NeighborQuery {
                direction: spec.direction,
                max_depth: spec.relation_level.max(1),
                relationship_types: vec![spec.relation.clone()],
                limit,
                ..self.query(asset_id)
            };
            match store.related_nodes(&query).await {
                Ok(nodes) => {
                    debug!(
                        asset_id,
                        relation = %spec.relation,
                        found = nodes.len(),
                        "Relation traversal finished"
                    );
                    related.extend(nodes);
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        if let Err(e) = store.close().await {
            warn!(error = %e, "Failed to close graph store session");
        }
        outcome?;
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology_graph_store::{EdgeMerge, MemoryConnector, NodeUpsert, PropertyMap};

    async fn seeded() -> MemoryConnector {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        let label = CypherIdent::new("CI").unwrap();
        let nodes: Vec<NodeUpsert> = ["D1", "D2", "D3"]
            .iter()
            .map(|id| NodeUpsert {
                asset_id: id.to_string(),
                internal_asset_id: format!("i-{}", id),
                secondary_label: None,
                attributes: PropertyMap::new(),
            })
            .collect();
        store.upsert_nodes(&label, &nodes, false).await.unwrap();
        let edges = vec![
            EdgeMerge {
                source_asset_id: "D1".to_string(),
                target_asset_id: "D2".to_string(),
                relationship_type: CypherIdent::new("CONNECTS_TO").unwrap(),
                attributes: PropertyMap::new(),
            },
            EdgeMerge {
                source_asset_id: "D3".to_string(),
                target_asset_id: "D1".to_string(),
                relationship_type: CypherIdent::new("HOSTS").unwrap(),
                attributes: PropertyMap::new(),
            },
        ];
        store.merge_edges(&label, &edges).await.unwrap();
        store.close().await.unwrap();
        connector
    }

    #[tokio::test]
    async fn test_related_defaults_to_both_directions() {
        let connector = seeded().await;
        let retriever =
            NeighborRetriever::new(Arc::new(connector.clone()), CypherIdent::new("CI").unwrap());

        let related = retriever.related(&retriever.query("D1")).await.unwrap();
        let mut ids: Vec<&str> = related.iter().map(|r| r.asset_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["D2", "D3"]);

        let snapshot = connector.snapshot().await;
        assert_eq!(snapshot.sessions_opened, snapshot.sessions_closed);
    }

    #[tokio::test]
    async fn test_related_by_type_and_direction() {
        let connector = seeded().await;
        let retriever = NeighborRetriever::new(Arc::new(connector), CypherIdent::new("CI").unwrap());

        let mut query = retriever.query("D1");
        query.direction = Direction::Incoming;
        let related = retriever.related(&query).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].relationship_type, "HOSTS");

        query.relationship_types = vec!["CONNECTS_TO".to_string()];
        assert!(retriever.related(&query).await.unwrap().is_empty());

        assert!(retriever
            .related(&retriever.query("D404"))
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_relation_spec_parsing() {
        let spec: RelationSpec = "HOSTS:3:incoming".parse().unwrap();
        assert_eq!(spec.relation, "HOSTS");
        assert_eq!(spec.relation_level, 3);
        assert_eq!(spec.direction, Direction::Incoming);

        let spec: RelationSpec = "CONNECTS_TO".parse().unwrap();
        assert_eq!(spec.relation_level, DEFAULT_LEVELS);
        assert_eq!(spec.direction, Direction::Both);

        assert!("".parse::<RelationSpec>().is_err());
        assert!("HOSTS:0".parse::<RelationSpec>().is_err());
        assert!("HOSTS:many".parse::<RelationSpec>().is_err());
    }

    #[test]
    fn test_relation_spec_from_json() {
        let specs: Vec<RelationSpec> = serde_json::from_str(
            r#"[{"relation": "HOSTS", "relationLevel": 2, "direction": "outgoing"},
                {"relation": "CONNECTS_TO"}]"#,
        )
        .unwrap();
        assert_eq!(specs[0].relation_level, 2);
        assert_eq!(specs[0].direction, Direction::Outgoing);
        assert_eq!(specs[1].relation_level, DEFAULT_LEVELS);
        assert_eq!(specs[1].direction, Direction::Both);
    }

    #[tokio::test]
    async fn test_related_by_relations_combines_traversals() {
        let connector = seeded().await;
        let retriever =
            NeighborRetriever::new(Arc::new(connector.clone()), CypherIdent::new("CI").unwrap());
        let specs = vec![
            "CONNECTS_TO:1:outgoing".parse().unwrap(),
            "HOSTS:1:incoming".parse().unwrap(),
            "HOSTS:1:outgoing".parse().unwrap(),
        ];

        let related = retriever
            .related_by_relations("D1", &specs, DEFAULT_LIMIT)
            .await
            .unwrap();
        let found: Vec<(&str, &str)> = related
            .iter()
            .map(|r| (r.asset_id.as_str(), r.relationship_type.as_str()))
            .collect();
        assert_eq!(found, vec![("D2", "CONNECTS_TO"), ("D3", "HOSTS")]);

        let snapshot = connector.snapshot().await;
        assert_eq!(snapshot.sessions_opened, 2);
        assert_eq!(snapshot.sessions_opened, snapshot.sessions_closed);
    }
}

//! Configuration for the topology loader.
//!
//! Settings are read once from the environment (optionally seeded from a
//! `.env` file by the binary) into typed structs and validated on the spot.
//!
//! # Environment Variables
//!
//! - `NEO4J_URI`: Bolt URI (required for the `neo4j` backend)
//! - `NEO4J_USER` / `NEO4J_PASSWORD`: credentials (default: empty)
//! - `NEO4J_DATABASE`: database name (default: server default)
//! - `NEO4J_MAX_CONNECTIONS`: pool size (default: 4)
//! - `TOPOLOGY_STORE_BACKEND`: `neo4j` or `memory` (default: neo4j)
//! - `TOPOLOGY_NODE_LABEL`: node label (required)
//! - `TOPOLOGY_UNIQUENESS_MODE`: `single` or `composite` (default: single)
//! - `TOPOLOGY_CONSTRAINT_KIND`: `node-key` or `unique` (default: node-key)
//! - `TOPOLOGY_BATCH_SIZE`: rows per transaction (default: 10000)
//! - `TOPOLOGY_SECONDARY_LABELS`: add the device type as a label (default: false)
//! - `TOPOLOGY_INDEX_PROPERTIES`: comma-separated node properties to index
//! - `TOPOLOGY_FIELD_MAPPING`: path to a JSON mapping table, or
//!   `device-topology` (default)

use std::env;
use std::path::Path;
use std::sync::Arc;

use topology_graph_store::config::DEFAULT_MAX_CONNECTIONS;
use topology_graph_store::{
    ConstraintKind, ConstraintSpec, CypherIdent, GraphStoreConnector, IndexSpec, MemoryConnector,
    Neo4jConfig, Neo4jConnector, UniquenessMode,
};

use crate::errors::ConfigError;
use crate::mapping::FieldMapper;

/// Default rows per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Name of the built-in mapping table.
pub const DEVICE_TOPOLOGY_PRESET: &str = "device-topology";

/// What the loader writes and how.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub node_label: CypherIdent,
    pub uniqueness: UniquenessMode,
    pub constraint_kind: ConstraintKind,
    pub batch_size: usize,
    pub mapper: FieldMapper,
    /// Add each device's `type` as an extra label.
    pub secondary_labels: bool,
    pub index_properties: Vec<CypherIdent>,
}

impl LoaderConfig {
    /// Defaults for everything except the label.
    pub fn new(node_label: &str) -> Result<Self, ConfigError> {
        let node_label = CypherIdent::new(node_label)
            .map_err(|e| ConfigError::invalid("TOPOLOGY_NODE_LABEL", e.to_string()))?;
        Ok(Self {
            node_label,
            uniqueness: UniquenessMode::default(),
            constraint_kind: ConstraintKind::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            mapper: FieldMapper::device_topology(),
            secondary_labels: false,
            index_properties: Vec::new(),
        })
    }

    pub fn with_uniqueness(mut self, uniqueness: UniquenessMode) -> Self {
        self.uniqueness = uniqueness;
        self
    }

    pub fn with_constraint_kind(mut self, kind: ConstraintKind) -> Self {
        self.constraint_kind = kind;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_mapper(mut self, mapper: FieldMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_secondary_labels(mut self, enabled: bool) -> Self {
        self.secondary_labels = enabled;
        self
    }

    pub fn with_index_properties(mut self, properties: Vec<CypherIdent>) -> Self {
        self.index_properties = properties;
        self
    }

    /// Read and validate from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read and validate from any variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let label = non_empty(&lookup, "TOPOLOGY_NODE_LABEL")
            .ok_or_else(|| ConfigError::missing("TOPOLOGY_NODE_LABEL"))?;
        let mut config = Self::new(&label)?;

        if let Some(mode) = non_empty(&lookup, "TOPOLOGY_UNIQUENESS_MODE") {
            config.uniqueness = match mode.to_lowercase().as_str() {
                "single" => UniquenessMode::Single,
                "composite" => UniquenessMode::Composite,
                _ => {
                    return Err(ConfigError::invalid(
                        "TOPOLOGY_UNIQUENESS_MODE",
                        format!("expected single or composite, got {}", mode),
                    ))
                }
            };
        }

        if let Some(kind) = non_empty(&lookup, "TOPOLOGY_CONSTRAINT_KIND") {
            config.constraint_kind = match kind.to_lowercase().as_str() {
                "node-key" | "node_key" | "nodekey" => ConstraintKind::NodeKey,
                "unique" => ConstraintKind::Unique,
                _ => {
                    return Err(ConfigError::invalid(
                        "TOPOLOGY_CONSTRAINT_KIND",
                        format!("expected node-key or unique, got {}", kind),
                    ))
                }
            };
        }

        if let Some(size) = non_empty(&lookup, "TOPOLOGY_BATCH_SIZE") {
            config.batch_size = size.parse::<usize>().map_err(|e| {
                ConfigError::invalid("TOPOLOGY_BATCH_SIZE", format!("{}: {}", size, e))
            })?;
        }

        if let Some(flag) = non_empty(&lookup, "TOPOLOGY_SECONDARY_LABELS") {
            config.secondary_labels = parse_flag("TOPOLOGY_SECONDARY_LABELS", &flag)?;
        }

        if let Some(list) = non_empty(&lookup, "TOPOLOGY_INDEX_PROPERTIES") {
            config.index_properties = list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| {
                    CypherIdent::new(p).map_err(|e| {
                        ConfigError::invalid("TOPOLOGY_INDEX_PROPERTIES", e.to_string())
                    })
                })
                .collect::<Result<_, _>>()?;
        }

        config.mapper = match non_empty(&lookup, "TOPOLOGY_FIELD_MAPPING") {
            None => FieldMapper::device_topology(),
            Some(preset) if preset == DEVICE_TOPOLOGY_PRESET => FieldMapper::device_topology(),
            Some(path) => FieldMapper::from_json_file(Path::new(&path))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check settings that builders cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid(
                "TOPOLOGY_BATCH_SIZE",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn constraint_spec(&self) -> ConstraintSpec {
        ConstraintSpec::new(self.node_label.clone(), self.uniqueness, self.constraint_kind)
    }

    pub fn index_specs(&self) -> Vec<IndexSpec> {
        self.index_properties
            .iter()
            .map(|property| IndexSpec::new(self.node_label.clone(), property.clone()))
            .collect()
    }
}

/// Which graph store a run writes to.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Neo4j(Neo4jConfig),
    /// A fresh in-memory graph, discarded at exit.
    Memory,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = non_empty(&lookup, "TOPOLOGY_STORE_BACKEND")
            .unwrap_or_else(|| "neo4j".to_string())
            .to_lowercase();
        match backend.as_str() {
            "memory" => Ok(Self::Memory),
            "neo4j" => {
                let uri =
                    non_empty(&lookup, "NEO4J_URI").ok_or_else(|| ConfigError::missing("NEO4J_URI"))?;
                let user = lookup("NEO4J_USER").unwrap_or_default();
                let password = lookup("NEO4J_PASSWORD").unwrap_or_default();
                let mut config = Neo4jConfig::new(uri, user, password);

                if let Some(database) = non_empty(&lookup, "NEO4J_DATABASE") {
                    config = config.with_database(database);
                }

                let max_connections = match non_empty(&lookup, "NEO4J_MAX_CONNECTIONS") {
                    Some(raw) => raw.parse::<usize>().map_err(|e| {
                        ConfigError::invalid("NEO4J_MAX_CONNECTIONS", format!("{}: {}", raw, e))
                    })?,
                    None => DEFAULT_MAX_CONNECTIONS,
                };
                if max_connections == 0 {
                    return Err(ConfigError::invalid(
                        "NEO4J_MAX_CONNECTIONS",
                        "must be greater than zero",
                    ));
                }
                Ok(Self::Neo4j(config.with_max_connections(max_connections)))
            }
            other => Err(ConfigError::invalid(
                "TOPOLOGY_STORE_BACKEND",
                format!("expected neo4j or memory, got {}", other),
            )),
        }
    }

    pub fn connector(&self) -> Arc<dyn GraphStoreConnector> {
        match self {
            Self::Neo4j(config) => Arc::new(Neo4jConnector::new(config.clone())),
            Self::Memory => Arc::new(MemoryConnector::new()),
        }
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(
            name,
            format!("expected a boolean, got {}", value),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_loader_defaults() {
        let config = LoaderConfig::from_lookup(lookup(&[("TOPOLOGY_NODE_LABEL", "CI")])).unwrap();
        assert_eq!(config.node_label.as_str(), "CI");
        assert_eq!(config.uniqueness, UniquenessMode::Single);
        assert_eq!(config.constraint_kind, ConstraintKind::NodeKey);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!config.secondary_labels);
        assert!(config.index_properties.is_empty());
        assert_eq!(config.mapper, FieldMapper::device_topology());
    }

    #[test]
    fn test_label_is_required() {
        assert_eq!(
            LoaderConfig::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::missing("TOPOLOGY_NODE_LABEL")
        );
    }

    #[test]
    fn test_loader_overrides() {
        let config = LoaderConfig::from_lookup(lookup(&[
            ("TOPOLOGY_NODE_LABEL", "Device"),
            ("TOPOLOGY_UNIQUENESS_MODE", "Composite"),
            ("TOPOLOGY_CONSTRAINT_KIND", "unique"),
            ("TOPOLOGY_BATCH_SIZE", "500"),
            ("TOPOLOGY_SECONDARY_LABELS", "yes"),
            ("TOPOLOGY_INDEX_PROPERTIES", "assetName, site,"),
            ("TOPOLOGY_FIELD_MAPPING", "device-topology"),
        ]))
        .unwrap();
        assert_eq!(config.uniqueness, UniquenessMode::Composite);
        assert_eq!(config.constraint_kind, ConstraintKind::Unique);
        assert_eq!(config.batch_size, 500);
        assert!(config.secondary_labels);
        let names: Vec<String> = config.index_specs().iter().map(IndexSpec::name).collect();
        assert_eq!(names, vec!["Device_assetName_index", "Device_site_index"]);
        assert_eq!(config.constraint_spec().name(), "Device_composite_unique");
    }

    #[test]
    fn test_invalid_loader_values() {
        for (name, value) in [
            ("TOPOLOGY_BATCH_SIZE", "0"),
            ("TOPOLOGY_BATCH_SIZE", "lots"),
            ("TOPOLOGY_UNIQUENESS_MODE", "triple"),
            ("TOPOLOGY_CONSTRAINT_KIND", "exists"),
            ("TOPOLOGY_SECONDARY_LABELS", "maybe"),
        ] {
            let result =
                LoaderConfig::from_lookup(lookup(&[("TOPOLOGY_NODE_LABEL", "CI"), (name, value)]));
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { .. })),
                "{}={} should be rejected",
                name,
                value
            );
        }
    }

    #[test]
    fn test_missing_mapping_file() {
        let result = LoaderConfig::from_lookup(lookup(&[
            ("TOPOLOGY_NODE_LABEL", "CI"),
            ("TOPOLOGY_FIELD_MAPPING", "/nonexistent/mapping.json"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidMapping(_))));
    }

    #[test]
    fn test_store_requires_uri() {
        assert_eq!(
            StoreConfig::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::missing("NEO4J_URI")
        );
    }

    #[test]
    fn test_store_neo4j_settings() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("NEO4J_URI", "neo4j://db:7687"),
            ("NEO4J_USER", "loader"),
            ("NEO4J_PASSWORD", "pw"),
            ("NEO4J_DATABASE", "topology"),
            ("NEO4J_MAX_CONNECTIONS", "8"),
        ]))
        .unwrap();
        match config {
            StoreConfig::Neo4j(neo4j) => {
                assert_eq!(neo4j.uri, "neo4j://db:7687");
                assert_eq!(neo4j.user, "loader");
                assert_eq!(neo4j.database.as_deref(), Some("topology"));
                assert_eq!(neo4j.max_connections, 8);
            }
            StoreConfig::Memory => panic!("expected neo4j backend"),
        }
    }

    #[test]
    fn test_store_memory_backend() {
        let config =
            StoreConfig::from_lookup(lookup(&[("TOPOLOGY_STORE_BACKEND", "memory")])).unwrap();
        assert!(matches!(config, StoreConfig::Memory));
        assert!(StoreConfig::from_lookup(lookup(&[("TOPOLOGY_STORE_BACKEND", "sqlite")])).is_err());
    }
}

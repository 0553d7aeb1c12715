//! Field mapping from external CSV columns to canonical node attributes.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use topology_graph_store::types::{ASSET_ID_PROPERTY, INTERNAL_ASSET_ID_PROPERTY};
use topology_graph_store::{CypherIdent, PropertyMap};

use crate::errors::ConfigError;
use crate::source::RawRow;

/// Canonical attribute that may carry a secondary label.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Column table of the device topology export.
const DEVICE_TOPOLOGY: [(&str, &str); 21] = [
    ("assetId", "Asset ID"),
    ("assetName", "Asset Name"),
    ("type", "Type"),
    ("description", "Description"),
    ("ipAddress", "IP Address"),
    ("macAddress", "MAC Address"),
    ("serialNumber", "Serial Number"),
    ("modelNumber", "Model Number"),
    ("deviceStatus", "Status"),
    ("decommissioned", "Decommissioned"),
    ("businessCriticality", "Business Criticality"),
    ("impactRadius", "Impact Radius"),
    ("resourceGroup", "Resource Group"),
    ("vendor", "Vendor"),
    ("manufacturer", "Manufacturer"),
    ("deviceContact", "Device Contact"),
    ("country", "Country"),
    ("site", "Site"),
    ("region", "Region"),
    ("businessTimeZone", "Business Time Zone"),
    ("tags", "Tags"),
];

/// One (canonical attribute, source column) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub canonical: String,
    pub column: String,
}

impl FieldMapping {
    pub fn new(canonical: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            canonical: canonical.into(),
            column: column.into(),
        }
    }
}

/// Translates raw rows into canonical attributes.
///
/// The table is ordered and validated at construction; `map` is total over the
/// declared fields, so every canonical name is present in its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapper {
    mappings: Vec<FieldMapping>,
}

impl FieldMapper {
    /// Build a mapper from an ordered table.
    ///
    /// # Returns
    ///
    /// * `Ok(FieldMapper)` - If the table is usable
    /// * `Err(ConfigError::InvalidMapping)` - If the table is empty, lacks
    ///   `assetId`, repeats a canonical name, maps `internalAssetId`, or
    ///   names an invalid property
    pub fn new(mappings: Vec<FieldMapping>) -> Result<Self, ConfigError> {
        if mappings.is_empty() {
            return Err(ConfigError::mapping("mapping table is empty"));
        }

        let mut seen = HashSet::new();
        for mapping in &mappings {
            CypherIdent::new(mapping.canonical.as_str()).map_err(|e| {
                ConfigError::mapping(format!("canonical name {:?}: {}", mapping.canonical, e))
            })?;
            if mapping.column.trim().is_empty() {
                return Err(ConfigError::mapping(format!(
                    "column for {} must not be blank",
                    mapping.canonical
                )));
            }
            if mapping.canonical == INTERNAL_ASSET_ID_PROPERTY {
                return Err(ConfigError::mapping(format!(
                    "{} is generated by the loader and cannot be mapped",
                    INTERNAL_ASSET_ID_PROPERTY
                )));
            }
            if !seen.insert(mapping.canonical.as_str()) {
                return Err(ConfigError::mapping(format!(
                    "canonical name {} appears more than once",
                    mapping.canonical
                )));
            }
        }

        if !seen.contains(ASSET_ID_PROPERTY) {
            return Err(ConfigError::mapping(format!(
                "table must map {}",
                ASSET_ID_PROPERTY
            )));
        }

        Ok(Self { mappings })
    }

    /// The 21-column device topology table.
    pub fn device_topology() -> Self {
        Self {
            mappings: DEVICE_TOPOLOGY
                .iter()
                .map(|(canonical, column)| FieldMapping::new(*canonical, *column))
                .collect(),
        }
    }

    /// Parse a JSON array of `{"canonical": ..., "column": ...}` objects.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let mappings: Vec<FieldMapping> = serde_json::from_str(json)
            .map_err(|e| ConfigError::mapping(format!("malformed JSON: {}", e)))?;
        Self::new(mappings)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::mapping(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    /// Source column that carries `canonical`, if declared.
    pub fn column_for(&self, canonical: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.canonical == canonical)
            .map(|m| m.column.as_str())
    }

    /// Map one row. Absent columns coalesce to the empty string.
    pub fn map(&self, row: &RawRow) -> PropertyMap {
        self.mappings
            .iter()
            .map(|m| {
                let value = row.get(&m.column).cloned().unwrap_or_default();
                (m.canonical.clone(), value)
            })
            .collect()
    }
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::device_topology()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_device_topology_table_is_valid() {
        let preset = FieldMapper::device_topology();
        assert_eq!(preset.mappings().len(), 21);
        assert_eq!(FieldMapper::new(preset.mappings().to_vec()), Ok(preset.clone()));
        assert_eq!(preset.column_for("modelNumber"), Some("Model Number"));
        assert_eq!(preset.column_for("deviceStatus"), Some("Status"));
    }

    #[test]
    fn test_map_is_total() {
        let mapper = FieldMapper::device_topology();
        let attributes = mapper.map(&row(&[("Asset ID", "D1"), ("Vendor", "Acme")]));
        assert_eq!(attributes.len(), 21);
        assert_eq!(attributes["assetId"], "D1");
        assert_eq!(attributes["vendor"], "Acme");
        assert_eq!(attributes["tags"], "");
    }

    #[test]
    fn test_map_ignores_unknown_columns() {
        let mapper = FieldMapper::new(vec![FieldMapping::new("assetId", "id")]).unwrap();
        let attributes = mapper.map(&row(&[("id", "D7"), ("Colour", "red")]));
        assert_eq!(attributes.len(), 1);
        assert!(!attributes.contains_key("Colour"));
    }

    #[test]
    fn test_rejects_empty_table() {
        assert!(matches!(
            FieldMapper::new(vec![]),
            Err(ConfigError::InvalidMapping(_))
        ));
    }

    #[test]
    fn test_rejects_table_without_identity() {
        let err = FieldMapper::new(vec![FieldMapping::new("assetName", "Asset Name")]).unwrap_err();
        assert!(err.to_string().contains("assetId"));
    }

    #[test]
    fn test_rejects_duplicates_and_internal_id() {
        assert!(FieldMapper::new(vec![
            FieldMapping::new("assetId", "Asset ID"),
            FieldMapping::new("assetId", "ID"),
        ])
        .is_err());
        assert!(FieldMapper::new(vec![
            FieldMapping::new("assetId", "Asset ID"),
            FieldMapping::new("internalAssetId", "Internal"),
        ])
        .is_err());
    }

    #[test]
    fn test_from_json_str() {
        let mapper = FieldMapper::from_json_str(
            r#"[{"canonical": "assetId", "column": "Id"}, {"canonical": "site", "column": "Location"}]"#,
        )
        .unwrap();
        assert_eq!(mapper.column_for("site"), Some("Location"));
        assert!(FieldMapper::from_json_str("{").is_err());
    }
}

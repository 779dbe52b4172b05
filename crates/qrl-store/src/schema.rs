//! # Schema Catalogue
//!
//! Per record type introspection: the removal capability, the review
//! fast path, and the names of the version and active-flag fields.
//!
//! A catalogue can be declared in YAML:
//!
//! ```yaml
//! - type_name: sop
//!   removable: true
//! - type_name: calibration
//!   review_exempt: true
//!   active_flag_field: in_force
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

fn default_version_field() -> String {
    "version".to_string()
}

fn default_active_flag_field() -> String {
    "active".to_string()
}

/// Schema metadata for one record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordSchema {
    /// Record type name.
    pub type_name: String,
    /// Records of this type may be removed and restored.
    #[serde(default)]
    pub removable: bool,
    /// Submissions skip inspection even under high security.
    #[serde(default)]
    pub review_exempt: bool,
    /// Name of the version field.
    #[serde(default = "default_version_field")]
    pub version_field: String,
    /// Name of the active-flag field.
    #[serde(default = "default_active_flag_field")]
    pub active_flag_field: String,
}

impl RecordSchema {
    /// A schema with default field names and no capabilities.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            removable: false,
            review_exempt: false,
            version_field: default_version_field(),
            active_flag_field: default_active_flag_field(),
        }
    }

    /// Declare the removal capability.
    pub fn removable(mut self) -> Self {
        self.removable = true;
        self
    }

    /// Declare the review fast path.
    pub fn review_exempt(mut self) -> Self {
        self.review_exempt = true;
        self
    }
}

/// Schema introspection.
pub trait SchemaCatalog: Send + Sync {
    /// Schema for a record type.
    fn schema(&self, record_type: &str) -> Option<RecordSchema>;

    /// Whether records of the type may be removed and restored.
    fn has_removal_capability(&self, record_type: &str) -> bool {
        self.schema(record_type).is_some_and(|s| s.removable)
    }

    /// Name of the type's version field.
    fn version_field(&self, record_type: &str) -> String {
        self.schema(record_type)
            .map_or_else(default_version_field, |s| s.version_field)
    }

    /// Name of the type's active-flag field.
    fn active_flag_field(&self, record_type: &str) -> String {
        self.schema(record_type)
            .map_or_else(default_active_flag_field, |s| s.active_flag_field)
    }

    /// Whether submissions of the type skip inspection.
    fn is_review_exempt(&self, record_type: &str) -> bool {
        self.schema(record_type).is_some_and(|s| s.review_exempt)
    }
}

/// A fixed catalogue built at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaCatalog {
    schemas: HashMap<String, RecordSchema>,
}

impl StaticSchemaCatalog {
    /// An empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a schema.
    pub fn with(mut self, schema: RecordSchema) -> Self {
        self.schemas.insert(schema.type_name.clone(), schema);
        self
    }

    /// Parse a YAML list of schemas.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, StoreError> {
        let schemas: Vec<RecordSchema> =
            serde_yaml::from_str(yaml).map_err(|e| StoreError::Schema(e.to_string()))?;
        Ok(schemas.into_iter().fold(Self::new(), Self::with))
    }

    /// Load a YAML schema file.
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Schema(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&raw)
    }

    /// Number of declared types.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether no type is declared.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl SchemaCatalog for StaticSchemaCatalog {
    fn schema(&self, record_type: &str) -> Option<RecordSchema> {
        self.schemas.get(record_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_has_no_capabilities() {
        let catalog = StaticSchemaCatalog::new();
        assert!(!catalog.has_removal_capability("sop"));
        assert!(!catalog.is_review_exempt("sop"));
        assert_eq!(catalog.version_field("sop"), "version");
        assert_eq!(catalog.active_flag_field("sop"), "active");
    }

    #[test]
    fn yaml_catalogue_applies_defaults() {
        let catalog = StaticSchemaCatalog::from_yaml_str(
            "- type_name: sop\n  removable: true\n\
             - type_name: calibration\n  review_exempt: true\n  active_flag_field: in_force\n",
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.has_removal_capability("sop"));
        assert!(!catalog.has_removal_capability("calibration"));
        assert!(catalog.is_review_exempt("calibration"));
        assert_eq!(catalog.active_flag_field("calibration"), "in_force");
        assert_eq!(catalog.version_field("calibration"), "version");
    }

    #[test]
    fn yaml_rejects_unknown_keys() {
        let err = StaticSchemaCatalog::from_yaml_str("- type_name: sop\n  deletable: true\n")
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[test]
    fn from_file_reads_catalogue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemas.yaml");
        std::fs::write(&path, "- type_name: sop\n  removable: true\n").unwrap();
        let catalog = StaticSchemaCatalog::from_file(&path).unwrap();
        assert!(catalog.has_removal_capability("sop"));
    }
}

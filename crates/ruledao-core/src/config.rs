//! DAO configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::constraint::{ConstraintDecl, EvaluationTime, OperationMode};
use crate::error::Error;
use crate::storage::StorageConfig;

/// Switchboard deciding which validation phases run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Phases {
    /// PRE_CONDITION checks of CREATE and UPDATE.
    pub pre_integrity: bool,
    /// PRE_CONDITION checks of DELETE.
    pub pre_referential: bool,
    /// POST_CONDITION checks of every mode.
    pub post_referential: bool,
}

impl Default for Phases {
    fn default() -> Self {
        Self::all()
    }
}

impl Phases {
    /// Every phase enabled.
    pub fn all() -> Self {
        Self {
            pre_integrity: true,
            pre_referential: true,
            post_referential: true,
        }
    }

    /// No validation at all.
    pub fn none() -> Self {
        Self {
            pre_integrity: false,
            pre_referential: false,
            post_referential: false,
        }
    }

    pub fn with_pre_integrity(mut self, enabled: bool) -> Self {
        self.pre_integrity = enabled;
        self
    }

    pub fn with_pre_referential(mut self, enabled: bool) -> Self {
        self.pre_referential = enabled;
        self
    }

    pub fn with_post_referential(mut self, enabled: bool) -> Self {
        self.post_referential = enabled;
        self
    }

    /// Whether validation runs for `(mode, time)`.
    pub fn allows(&self, mode: OperationMode, time: EvaluationTime) -> bool {
        match (time, mode) {
            (EvaluationTime::PostCondition, _) => self.post_referential,
            (EvaluationTime::PreCondition, OperationMode::Delete) => self.pre_referential,
            (EvaluationTime::PreCondition, _) => self.pre_integrity,
        }
    }
}

/// Configuration for a [`Dao`](crate::Dao).
///
/// ```json
/// {
///   "storage": { "path": "./data", "flush_every_ms": null },
///   "phases": { "post_referential": false },
///   "continue_on_error": true,
///   "properties": { "default.zone": "EU" },
///   "declarations": {
///     "Country": [
///       { "kind": "bounded_count", "query": "find Country where code = ${code}",
///         "max": 0, "message": "country.duplicate_code" }
///     ]
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    /// Storage engine settings.
    pub storage: StorageConfig,
    /// Default validation phases.
    pub phases: Phases,
    /// Whether batch operations record item failures and keep going.
    pub continue_on_error: bool,
    /// Named values that unresolvable `${name}` references fall back to.
    pub properties: BTreeMap<String, JsonValue>,
    /// Extra declarations per entity type, added to the type's own.
    pub declarations: BTreeMap<String, Vec<ConstraintDecl>>,
}

impl DaoConfig {
    /// Configuration with the given storage settings.
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            ..Default::default()
        }
    }

    /// Parse a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Set the default phases.
    pub fn with_phases(mut self, phases: Phases) -> Self {
        self.phases = phases;
        self
    }

    /// Set batch error handling.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Add a named configuration value.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Add a declaration for an entity type.
    pub fn with_declaration(mut self, entity: impl Into<String>, decl: impl Into<ConstraintDecl>) -> Self {
        self.declarations
            .entry(entity.into())
            .or_default()
            .push(decl.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::BoundedCountDecl;

    #[test]
    fn test_phases_allow() {
        let phases = Phases::all().with_pre_integrity(false);
        assert!(!phases.allows(OperationMode::Create, EvaluationTime::PreCondition));
        assert!(!phases.allows(OperationMode::Update, EvaluationTime::PreCondition));
        assert!(phases.allows(OperationMode::Delete, EvaluationTime::PreCondition));
        assert!(phases.allows(OperationMode::Create, EvaluationTime::PostCondition));

        let none = Phases::none();
        for mode in OperationMode::ALL {
            for time in EvaluationTime::ALL {
                assert!(!none.allows(mode, time));
            }
        }
    }

    #[test]
    fn test_from_json() {
        let config = DaoConfig::from_json_str(
            r#"{
                "storage": {"path": "/tmp/ruledao", "compression": false},
                "phases": {"post_referential": false},
                "continue_on_error": true,
                "properties": {"default.zone": "EU"},
                "declarations": {
                    "Country": [{"kind": "non_empty", "query": "find Zone", "message": "z"}]
                }
            }"#,
        )
        .unwrap();

        assert!(!config.storage.compression);
        assert_eq!(config.storage.cache_capacity, StorageConfig::default().cache_capacity);
        assert!(config.phases.pre_integrity);
        assert!(!config.phases.post_referential);
        assert!(config.continue_on_error);
        assert_eq!(config.properties["default.zone"], "EU");
        assert_eq!(config.declarations["Country"].len(), 1);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(DaoConfig::from_json_str("{"), Err(Error::Config(_))));
        assert!(matches!(
            DaoConfig::from_file("/definitely/not/here.json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = DaoConfig::new(StorageConfig::temporary())
            .with_continue_on_error(true)
            .with_property("limit", 3)
            .with_declaration("Country", BoundedCountDecl::new("find Country", "x"))
            .with_phases(Phases::none());
        assert!(config.storage.temporary);
        assert_eq!(config.properties["limit"], 3);
        assert_eq!(config.phases, Phases::none());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dao.json");
        let config = DaoConfig::default().with_continue_on_error(true);
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(DaoConfig::from_file(&path).unwrap(), config);
    }
}

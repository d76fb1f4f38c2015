//! Managed relational database attachment fields

use serde::{Deserialize, Serialize};

use super::validate_identifier;
use crate::Error;

fn default_engine_version() -> String {
    "14".to_string()
}

fn default_instance_class() -> String {
    "db.t3.micro".to_string()
}

fn default_db_name() -> String {
    "appdb".to_string()
}

fn default_username() -> String {
    "appuser".to_string()
}

// =============================================================================
// Engine kind
// =============================================================================

/// Supported managed database engines
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    /// PostgreSQL
    #[default]
    Postgres,
    /// MySQL
    Mysql,
}

impl DatabaseEngine {
    /// The engine's canonical listener port
    pub fn canonical_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Mysql => 3306,
        }
    }

    /// Engine identifier as the provider spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }
}

// =============================================================================
// Storage bounds
// =============================================================================

/// Allocated storage bounds in GiB. The instance starts at `min` and may
/// grow automatically up to `max`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StorageBounds {
    /// Initially allocated storage
    pub min: u32,
    /// Upper bound for storage autoscaling
    pub max: u32,
}

impl Default for StorageBounds {
    fn default() -> Self {
        Self { min: 20, max: 100 }
    }
}

// =============================================================================
// Database spec
// =============================================================================

/// Managed relational database attached to a container service
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Database engine kind
    #[serde(default)]
    pub engine: DatabaseEngine,

    /// Engine major version
    #[serde(default = "default_engine_version")]
    pub engine_version: String,

    /// Provider instance class
    #[serde(default = "default_instance_class")]
    pub instance_class: String,

    /// Storage bounds in GiB
    #[serde(default)]
    pub storage_gib: StorageBounds,

    /// Name of the initial database
    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// Master username. The password is generated by the engine and
    /// stored in the secret store, never supplied in the spec.
    #[serde(default = "default_username")]
    pub username: String,
}

impl Default for DatabaseSpec {
    fn default() -> Self {
        Self {
            engine: DatabaseEngine::default(),
            engine_version: default_engine_version(),
            instance_class: default_instance_class(),
            storage_gib: StorageBounds::default(),
            db_name: default_db_name(),
            username: default_username(),
        }
    }
}

impl DatabaseSpec {
    pub(crate) fn validate(&self, workload: &str) -> Result<(), Error> {
        if self.engine_version.is_empty() {
            return Err(Error::validation_for_field(
                workload,
                "database.engineVersion",
                "engine version must not be empty",
            ));
        }
        if self.instance_class.is_empty() {
            return Err(Error::validation_for_field(
                workload,
                "database.instanceClass",
                "instance class must not be empty",
            ));
        }
        let bounds = self.storage_gib;
        if bounds.min == 0 || bounds.min > bounds.max {
            return Err(Error::validation_for_field(
                workload,
                "database.storageGib",
                format!("invalid storage bounds {}..{}", bounds.min, bounds.max),
            ));
        }
        validate_identifier(workload, &self.db_name, "database.dbName")?;
        validate_identifier(workload, &self.username, "database.username")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let db = DatabaseSpec::default();
        assert_eq!(db.engine, DatabaseEngine::Postgres);
        assert_eq!(db.engine_version, "14");
        assert_eq!(db.instance_class, "db.t3.micro");
        assert_eq!(db.storage_gib, StorageBounds { min: 20, max: 100 });
        assert_eq!(db.username, "appuser");
    }

    #[test]
    fn canonical_ports() {
        assert_eq!(DatabaseEngine::Postgres.canonical_port(), 5432);
        assert_eq!(DatabaseEngine::Mysql.canonical_port(), 3306);
    }

    #[test]
    fn empty_spec_deserializes_with_defaults() {
        let db: DatabaseSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(db, DatabaseSpec::default());
    }

    #[test]
    fn zero_storage_is_rejected() {
        let mut db = DatabaseSpec::default();
        db.storage_gib = StorageBounds { min: 0, max: 100 };
        assert!(db.validate("todo").is_err());
    }
}

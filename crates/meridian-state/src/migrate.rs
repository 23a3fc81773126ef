//! Schema migration of persisted state records.
//!
//! Migration pipeline (upgrade only):
//!
//!   detect source version → major steps in sequence → minor (additive) step → tag
//!
//! Major steps may carry data forward between fields (1 → 2 copies the
//! deprecated `weather_data` into `weather_forecast`) but never delete or
//! rename. The additive step fills every field the target schema declares
//! with a non-null default and the record lacks.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use tracing::{debug, info};

use meridian_contracts::{
    error::{MeridianError, MeridianResult},
    schema::{SchemaVersion, SCHEMA_VERSION_FIELD},
};

use crate::catalog::SchemaCatalog;

#[derive(Debug, Clone, Default)]
pub struct Migrator {
    catalog: SchemaCatalog,
}

impl Migrator {
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// The record's schema version.
    ///
    /// An explicit `_schemaVersion` tag wins. Without one, the newest version
    /// that introduced any present field is assumed; a record with no
    /// recognised field is treated as the oldest registered version.
    pub fn detect_version(&self, record: &Map<String, Value>) -> MeridianResult<SchemaVersion> {
        if let Some(tag) = record.get(SCHEMA_VERSION_FIELD) {
            let tag = tag.as_str().ok_or_else(|| MeridianError::SchemaValidation {
                reason: format!("{SCHEMA_VERSION_FIELD} must be a string, got {tag}"),
            })?;
            return tag.parse();
        }
        let inferred = record
            .keys()
            .filter_map(|k| self.catalog.introduced_in(k))
            .max();
        match inferred {
            Some(version) => Ok(version),
            None => self
                .catalog
                .versions()
                .next()
                .copied()
                .ok_or_else(|| MeridianError::SchemaValidation {
                    reason: "schema catalog is empty".to_string(),
                }),
        }
    }

    /// Migrate `record` from `from` to `to`.
    ///
    /// Equal versions return the record untouched.
    ///
    /// # Errors
    ///
    /// `MigrationFailed` for a downgrade or an unregistered target version.
    pub fn migrate(
        &self,
        mut record: Map<String, Value>,
        from: SchemaVersion,
        to: SchemaVersion,
    ) -> MeridianResult<Map<String, Value>> {
        let fail = |reason: String| MeridianError::MigrationFailed {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };
        match from.compare(&to) {
            Ordering::Equal => return Ok(record),
            Ordering::Greater => return Err(fail("downgrades are not supported".to_string())),
            Ordering::Less => {}
        }
        let target = self
            .catalog
            .get(&to)
            .ok_or_else(|| fail(format!("no schema registered for {to}")))?;

        for major in (from.major + 1)..=to.major {
            apply_major_step(major, &mut record);
            debug!(major, "major migration step applied");
        }

        let mut added = 0usize;
        for spec in target.fields.values() {
            if spec.default.is_null() || record.contains_key(&spec.name) {
                continue;
            }
            record.insert(spec.name.clone(), spec.default.clone());
            added += 1;
        }

        record.insert(SCHEMA_VERSION_FIELD.to_string(), Value::String(to.to_string()));
        info!(from = %from, to = %to, fields_added = added, "state migrated");
        Ok(record)
    }

    /// Detect the record's version and migrate it to the newest schema.
    /// Returns the migrated record and the detected source version.
    pub fn upgrade(&self, record: Map<String, Value>) -> MeridianResult<(Map<String, Value>, SchemaVersion)> {
        let from = self.detect_version(&record)?;
        let to = self.catalog.latest()?.version;
        if from == to && record.contains_key(SCHEMA_VERSION_FIELD) {
            return Ok((record, from));
        }
        let mut migrated = self.migrate(record, from, to)?;
        migrated.insert(SCHEMA_VERSION_FIELD.to_string(), Value::String(to.to_string()));
        Ok((migrated, from))
    }
}

/// Data-carrying changes introduced by a major version.
fn apply_major_step(major: u32, record: &mut Map<String, Value>) {
    if major == 2 {
        let legacy = record.get("weather_data").filter(|v| !v.is_null()).cloned();
        if let Some(weather) = legacy {
            record.entry("weather_forecast").or_insert(weather);
        }
    }
}

//! Versioned state schema types.
//!
//! A `StateSchema` is an immutable field catalog for one `SchemaVersion`.
//! Versions have a total order so migrations can tell upgrade from downgrade.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MeridianError;

/// The version new states are created with.
pub const CURRENT_SCHEMA_VERSION: &str = "2.1.0";

/// The record key holding the explicit schema tag.
pub const SCHEMA_VERSION_FIELD: &str = "_schemaVersion";

/// A `major.minor.patch` schema version.
///
/// Field order gives the derived `Ord` its lexicographic meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn current() -> Self {
        // CURRENT_SCHEMA_VERSION is a literal checked by tests.
        Self::from_str(CURRENT_SCHEMA_VERSION).unwrap_or(Self::new(2, 1, 0))
    }

    /// Compare two versions; `Less` means `self` is older.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = MeridianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(MeridianError::SchemaValidation {
                reason: format!("schema version '{s}' is not major.minor.patch"),
            });
        }
        let parse = |p: &str| {
            p.parse::<u32>().map_err(|e| MeridianError::SchemaValidation {
                reason: format!("schema version '{s}' has non-numeric component '{p}': {e}"),
            })
        };
        Ok(Self::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = MeridianError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(v: SchemaVersion) -> Self {
        v.to_string()
    }
}

/// The semantic type a field's value must have.
///
/// Domain kinds (`Route`, `Weather`, ...) accept any of several structural
/// shapes; the state crate's shape contracts decide what qualifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Messages,
    Route,
    Weather,
    Ports,
    Bunker,
    Compliance,
    Any,
}

/// One entry in a schema's field catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub nullable: bool,
    /// Typical serialized size in bytes; informational.
    pub expected_size: usize,
    /// Per-field hard ceiling in bytes; 0 defers to the global limit.
    pub max_size: usize,
    pub deprecated: bool,
    /// Regenerable from other state; dropped by the optimize pass.
    pub computed: bool,
    pub default: Value,
    /// The schema version that first declared this field.
    pub introduced_in: SchemaVersion,
}

impl FieldSpec {
    pub fn new(name: &str, field_type: FieldType, introduced_in: SchemaVersion) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: false,
            nullable: true,
            expected_size: 256,
            max_size: 0,
            deprecated: false,
            computed: false,
            default: Value::Null,
            introduced_in,
        }
    }

    pub fn required(mut self, default: Value) -> Self {
        self.required = true;
        self.nullable = false;
        self.default = default;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn sized(mut self, expected: usize, max: usize) -> Self {
        self.expected_size = expected;
        self.max_size = max;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }
}

/// An immutable field catalog for one schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSchema {
    pub version: SchemaVersion,
    pub fields: BTreeMap<String, FieldSpec>,
}

impl StateSchema {
    pub fn new(version: SchemaVersion, fields: Vec<FieldSpec>) -> Self {
        Self {
            version,
            fields: fields.into_iter().map(|f| (f.name.clone(), f)).collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values().filter(|f| f.required)
    }
}

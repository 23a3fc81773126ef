//! The registered schema versions of `ComputationState`.
//!
//! Each version is a complete, cumulative field catalog. Versions:
//!
//! | version | change |
//! |---------|--------|
//! | 1.0.0 | conversation, per-agent maps, route/weather/bunker/ports payloads |
//! | 1.1.0 | `weather_forecast`, `compliance_data`, `price_data` |
//! | 2.0.0 | supervisor bookkeeping; `weather_data` deprecated in favour of `weather_forecast` |
//! | 2.1.0 | `routing_metadata` (computed), hull performance, weather consumption, `checksum` |

use std::collections::BTreeMap;

use serde_json::json;

use meridian_contracts::{
    error::{MeridianError, MeridianResult},
    schema::{FieldSpec, FieldType, SchemaVersion, StateSchema},
};

const KB: usize = 1024;

#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    schemas: BTreeMap<SchemaVersion, StateSchema>,
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::maritime()
    }
}

impl SchemaCatalog {
    /// Catalog from explicit schemas. Later duplicates of a version win.
    pub fn from_schemas(schemas: impl IntoIterator<Item = StateSchema>) -> Self {
        Self {
            schemas: schemas.into_iter().map(|s| (s.version, s)).collect(),
        }
    }

    /// The four maritime state schemas.
    pub fn maritime() -> Self {
        let v1_0 = SchemaVersion::new(1, 0, 0);
        let v1_1 = SchemaVersion::new(1, 1, 0);
        let v2_0 = SchemaVersion::new(2, 0, 0);
        let v2_1 = SchemaVersion::new(2, 1, 0);

        let mut fields = vec![
            FieldSpec::new("messages", FieldType::Messages, v1_0)
                .required(json!([]))
                .sized(4 * KB, 0),
            FieldSpec::new("correlation_id", FieldType::String, v1_0)
                .required(json!(""))
                .sized(64, 256),
            FieldSpec::new("agent_status", FieldType::Object, v1_0).required(json!({})),
            FieldSpec::new("agent_errors", FieldType::Object, v1_0).required(json!({})),
            FieldSpec::new("route_data", FieldType::Route, v1_0).sized(8 * KB, 512 * KB),
            FieldSpec::new("weather_data", FieldType::Weather, v1_0).sized(4 * KB, 0),
            FieldSpec::new("bunker_analysis", FieldType::Bunker, v1_0).sized(4 * KB, 0),
            FieldSpec::new("ports_found", FieldType::Ports, v1_0).sized(2 * KB, 0),
            FieldSpec::new("final_recommendation", FieldType::String, v1_0).sized(2 * KB, 0),
            FieldSpec::new("next_agent", FieldType::String, v1_0).sized(32, 256),
        ];
        let v1_0_schema = StateSchema::new(v1_0, fields.clone());

        fields.extend([
            FieldSpec::new("weather_forecast", FieldType::Weather, v1_1).sized(4 * KB, 0),
            FieldSpec::new("compliance_data", FieldType::Compliance, v1_1).sized(2 * KB, 0),
            FieldSpec::new("price_data", FieldType::Object, v1_1).sized(2 * KB, 0),
        ]);
        let v1_1_schema = StateSchema::new(v1_1, fields.clone());

        for field in fields.iter_mut().filter(|f| f.name == "weather_data") {
            field.deprecated = true;
        }
        fields.extend([
            FieldSpec::new("reasoning_history", FieldType::Array, v2_0)
                .required(json!([]))
                .sized(4 * KB, 0),
            FieldSpec::new("recovery_attempts", FieldType::Integer, v2_0).required(json!(0)),
            FieldSpec::new("original_intent", FieldType::String, v2_0).sized(32, 256),
            FieldSpec::new("needs_clarification", FieldType::Boolean, v2_0).required(json!(false)),
            FieldSpec::new("clarification_question", FieldType::String, v2_0).sized(256, 0),
            FieldSpec::new("agent_overrides", FieldType::Object, v2_0).required(json!({})),
        ]);
        let v2_0_schema = StateSchema::new(v2_0, fields.clone());

        fields.extend([
            FieldSpec::new("routing_metadata", FieldType::Object, v2_1)
                .computed()
                .sized(KB, 0),
            FieldSpec::new("hull_performance", FieldType::Object, v2_1).sized(4 * KB, 0),
            FieldSpec::new("weather_consumption", FieldType::Object, v2_1).sized(2 * KB, 0),
            FieldSpec::new("checksum", FieldType::Any, v2_1).sized(64, 0),
        ]);
        let v2_1_schema = StateSchema::new(v2_1, fields);

        Self::from_schemas([v1_0_schema, v1_1_schema, v2_0_schema, v2_1_schema])
    }

    pub fn get(&self, version: &SchemaVersion) -> Option<&StateSchema> {
        self.schemas.get(version)
    }

    pub fn require(&self, version: &SchemaVersion) -> MeridianResult<&StateSchema> {
        self.get(version).ok_or_else(|| MeridianError::SchemaValidation {
            reason: format!("no schema registered for version {version}"),
        })
    }

    /// The newest registered schema.
    pub fn latest(&self) -> MeridianResult<&StateSchema> {
        self.schemas
            .values()
            .next_back()
            .ok_or_else(|| MeridianError::SchemaValidation {
                reason: "schema catalog is empty".to_string(),
            })
    }

    /// Registered versions, oldest first.
    pub fn versions(&self) -> impl Iterator<Item = &SchemaVersion> {
        self.schemas.keys()
    }

    /// The version that introduced `field`, according to the newest schema.
    pub fn introduced_in(&self, field: &str) -> Option<SchemaVersion> {
        self.schemas
            .values()
            .next_back()
            .and_then(|s| s.field(field))
            .map(|f| f.introduced_in)
    }
}

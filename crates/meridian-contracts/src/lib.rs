//! # meridian-contracts
//!
//! The vocabulary meridian's registry, supervisor, and state lifecycle share:
//! agent descriptors and run records, the per-conversation
//! `ComputationState`, reasoning steps with their routing telemetry, and the
//! versioned state schemas checkpoints are validated and migrated against.
//! `MeridianError` is the one error type every crate returns.

pub mod agent;
pub mod error;
pub mod reasoning;
pub mod schema;
pub mod state;
pub mod validation;

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::*;
    use agent::{AgentDescriptor, AgentRunStatus, RuntimeMetadata};
    use error::MeridianError;
    use schema::{SchemaVersion, CURRENT_SCHEMA_VERSION};
    use state::{ComputationState, Message};
    use validation::{IssueKind, ValidationReport};

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("patch must be an object"),
        }
    }

    // ── SchemaVersion ────────────────────────────────────────────────────────

    #[test]
    fn schema_version_parses_and_displays() {
        let v: SchemaVersion = "2.1.0".parse().unwrap();
        assert_eq!(v, SchemaVersion::new(2, 1, 0));
        assert_eq!(v.to_string(), "2.1.0");
        assert_eq!(SchemaVersion::current().to_string(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn schema_version_total_order() {
        let v1 = SchemaVersion::new(1, 0, 0);
        let v11 = SchemaVersion::new(1, 1, 0);
        let v2 = SchemaVersion::new(2, 0, 0);
        assert!(v1 < v11);
        assert!(v11 < v2);
        assert!(SchemaVersion::new(1, 10, 0) > SchemaVersion::new(1, 9, 3));
    }

    #[test]
    fn schema_version_rejects_malformed() {
        assert!("2.1".parse::<SchemaVersion>().is_err());
        assert!("2.x.0".parse::<SchemaVersion>().is_err());
    }

    // ── ComputationState merge ───────────────────────────────────────────────

    #[test]
    fn merge_adds_domain_fields_without_dropping() {
        let mut state = ComputationState::new("corr-1");
        state
            .merge(patch(json!({ "route_data": { "distance_nm": 11000.0 } })))
            .unwrap();
        state
            .merge(patch(json!({ "weather_forecast": [{ "wave_height_m": 2.0 }] })))
            .unwrap();

        assert!(state.has_field("route_data"));
        assert!(state.has_field("weather_forecast"));
    }

    #[test]
    fn merge_appends_messages_and_merges_status_maps() {
        let mut state = ComputationState::new("corr-2");
        state.messages.push(Message::user("plan bunkering"));
        state
            .agent_status
            .insert("route_agent".to_string(), AgentRunStatus::Success);

        state
            .merge(patch(json!({
                "messages": [{ "role": "assistant", "content": "route ready" }],
                "agent_status": { "weather_agent": "failed" }
            })))
            .unwrap();

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.status_of("route_agent"), Some(AgentRunStatus::Success));
        assert_eq!(state.status_of("weather_agent"), Some(AgentRunStatus::Failed));
        assert_eq!(state.latest_query(), "plan bunkering");
    }

    #[test]
    fn record_round_trip_keeps_schema_tag() {
        let mut state = ComputationState::new("corr-3");
        state.domain.insert("checksum".to_string(), json!("abc"));
        let record = state.to_record().unwrap();
        assert_eq!(record["_schemaVersion"], json!(CURRENT_SCHEMA_VERSION));

        let back = ComputationState::from_record(record).unwrap();
        assert_eq!(back, state);
    }

    // ── AgentDescriptor / RuntimeMetadata ────────────────────────────────────

    #[test]
    fn descriptor_primary_output_is_first_produced_field() {
        let d = AgentDescriptor::new("route_agent", "Route Agent")
            .produces(["route_data", "route_summary"]);
        assert_eq!(d.primary_output(), Some("route_data"));
        assert!(d.is_active());
    }

    #[test]
    fn runtime_metadata_rolls_latency_and_success_rate() {
        let mut meta = RuntimeMetadata::default();
        meta.record(100, true);
        meta.record(300, false);

        assert_eq!(meta.total_executions, 2);
        assert_eq!(meta.successful_executions, 1);
        assert!((meta.avg_latency_ms - 200.0).abs() < f64::EPSILON);
        assert!((meta.success_rate - 0.5).abs() < f64::EPSILON);
    }

    // ── ValidationReport ─────────────────────────────────────────────────────

    #[test]
    fn validation_report_tracks_errors_and_warnings() {
        let mut report = ValidationReport::new();
        assert!(report.valid);

        report.warn(Some("legacy"), IssueKind::DeprecatedField, "deprecated");
        assert!(report.valid, "warnings never invalidate a record");

        report.error(Some("route_data"), IssueKind::TypeMismatch, "not a route");
        report.error(Some("route_data"), IssueKind::FieldTooLarge, "too big");
        assert!(!report.valid);
        assert_eq!(report.failing_fields(), vec!["route_data"]);
        assert!(!report.has_record_level_error());
        assert!(report.summary().contains("[route_data] not a route"));
    }

    // ── MeridianError display messages ───────────────────────────────────────

    #[test]
    fn error_dependency_cycle_display() {
        let err = MeridianError::DependencyCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn error_resource_classification() {
        let timeout = MeridianError::Timeout {
            operation: "agent weather_agent".to_string(),
            timeout_ms: 30_000,
        };
        let open = MeridianError::CircuitOpen {
            agent_id: "weather_agent".to_string(),
        };
        let failed = MeridianError::AgentFailed {
            agent_id: "weather_agent".to_string(),
            reason: "provider returned 500".to_string(),
        };
        assert!(timeout.is_resource_error());
        assert!(open.is_resource_error());
        assert!(!failed.is_resource_error());
        assert!(timeout.to_string().contains("30000ms"));
    }

    #[test]
    fn error_migration_failed_display() {
        let err = MeridianError::MigrationFailed {
            from: "2.1.0".to_string(),
            to: "1.0.0".to_string(),
            reason: "downgrade not supported".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2.1.0"));
        assert!(msg.contains("downgrade"));
    }
}

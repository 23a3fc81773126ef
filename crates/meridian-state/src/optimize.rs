//! Lossy size reduction for display checkpoints.
//!
//! Never run this on state the decision loop still needs: it drops computed
//! and deprecated fields, samples long arrays, truncates message bodies, and
//! strips empty values.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use meridian_contracts::schema::{StateSchema, SCHEMA_VERSION_FIELD};

use crate::limits::LifecycleLimits;
use crate::validate::record_size;

/// Typed bookkeeping fields; empties are only stripped at their top level.
const STRUCTURAL_FIELDS: [&str; 6] = [
    "messages",
    "agent_status",
    "agent_errors",
    "agent_overrides",
    "reasoning_history",
    "routing_metadata",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStats {
    pub fields_dropped: Vec<String>,
    pub arrays_bounded: usize,
    pub messages_truncated: usize,
    pub empties_stripped: usize,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    limits: LifecycleLimits,
}

impl Optimizer {
    pub fn new(limits: LifecycleLimits) -> Self {
        Self { limits }
    }

    pub fn optimize(
        &self,
        mut record: Map<String, Value>,
        schema: &StateSchema,
    ) -> (Map<String, Value>, OptimizationStats) {
        let mut stats = OptimizationStats {
            bytes_before: record_size(&record),
            ..OptimizationStats::default()
        };

        let droppable: Vec<String> = record
            .keys()
            .filter(|k| schema.field(k).is_some_and(|s| s.computed || s.deprecated))
            .cloned()
            .collect();
        for name in droppable {
            record.remove(&name);
            stats.fields_dropped.push(name);
        }

        if let Some(waypoints) = record
            .get_mut("route_data")
            .and_then(|r| r.get_mut("waypoints"))
            .and_then(Value::as_array_mut)
        {
            if self.bound(waypoints, |n| json!({ "_omitted": n })) {
                stats.arrays_bounded += 1;
            }
        }
        let ports = match record.get_mut("ports_found") {
            Some(Value::Array(items)) => Some(items),
            Some(Value::Object(map)) => map.get_mut("ports").and_then(Value::as_array_mut),
            _ => None,
        };
        if let Some(ports) = ports {
            if self.bound(ports, |n| json!({ "_omitted": n })) {
                stats.arrays_bounded += 1;
            }
        }
        if let Some(Value::Array(history)) = record.get_mut("reasoning_history") {
            let timestamp = Utc::now();
            if self.bound(history, |n| {
                json!({
                    "step_number": 0,
                    "thought": format!("{n} intermediate reasoning steps omitted"),
                    "action": "validate",
                    "action_params": { "omitted": n },
                    "timestamp": timestamp,
                })
            }) {
                stats.arrays_bounded += 1;
            }
        }

        if let Some(Value::Array(messages)) = record.get_mut("messages") {
            for message in messages.iter_mut() {
                if self.truncate_message(message) {
                    stats.messages_truncated += 1;
                }
            }
        }

        let keys: Vec<String> = record.keys().cloned().collect();
        for name in keys {
            let keep_empty = name == SCHEMA_VERSION_FIELD
                || schema.field(&name).is_some_and(|s| s.required);
            if !STRUCTURAL_FIELDS.contains(&name.as_str()) {
                if let Some(value) = record.get_mut(&name) {
                    stats.empties_stripped += strip_empty(value);
                }
            }
            if !keep_empty && record.get(&name).is_some_and(is_empty) {
                record.remove(&name);
                stats.empties_stripped += 1;
            }
        }

        stats.bytes_after = record_size(&record);
        debug!(
            dropped = stats.fields_dropped.len(),
            arrays_bounded = stats.arrays_bounded,
            messages_truncated = stats.messages_truncated,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "state optimized for display"
        );
        (record, stats)
    }

    /// Keep `array_head` + `array_tail` items around one marker. Returns
    /// whether anything was removed.
    fn bound(&self, items: &mut Vec<Value>, marker: impl FnOnce(usize) -> Value) -> bool {
        let (head, tail) = (self.limits.array_head, self.limits.array_tail);
        if items.len() <= head + tail + 1 {
            return false;
        }
        let omitted = items.len() - head - tail;
        let tail_items = items.split_off(items.len() - tail);
        items.truncate(head);
        items.push(marker(omitted));
        items.extend(tail_items);
        true
    }

    fn truncate_message(&self, message: &mut Value) -> bool {
        let max = self.limits.max_message_chars;
        let Some(obj) = message.as_object_mut() else {
            return false;
        };
        let Some(content) = obj.get("content").and_then(Value::as_str) else {
            return false;
        };
        let length = content.chars().count();
        if length <= max {
            return false;
        }
        let truncated: String = content.chars().take(max).chain("...".chars()).collect();
        obj.insert("content".into(), Value::String(truncated));
        obj.insert("original_length".into(), json!(length));
        true
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Recursively remove empty members of nested containers. Returns the count.
fn strip_empty(value: &mut Value) -> usize {
    let mut removed = 0;
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                removed += strip_empty(child);
            }
            let before = map.len();
            map.retain(|_, v| !is_empty(v));
            removed += before - map.len();
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                removed += strip_empty(child);
            }
            let before = items.len();
            items.retain(|v| !is_empty(v));
            removed += before - items.len();
        }
        _ => {}
    }
    removed
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use meridian_contracts::{
        reasoning::{ReasoningAction, ReasoningStep},
        state::{ComputationState, Message},
    };

    use super::*;
    use crate::catalog::SchemaCatalog;
    use crate::validate::Validator;

    fn schema() -> StateSchema {
        SchemaCatalog::maritime().latest().unwrap().clone()
    }

    fn step(n: u32) -> ReasoningStep {
        ReasoningStep {
            step_number: n,
            thought: format!("step {n}"),
            action: ReasoningAction::CallAgent,
            action_params: json!({ "agent": "route_agent" }),
            observation: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn drops_computed_and_deprecated_fields() {
        let mut record = ComputationState::new("c").to_record().unwrap();
        record.insert("routing_metadata".into(), json!({ "query_hash": "abc" }));
        record.insert("weather_data".into(), json!({ "forecast": [] }));

        let (out, stats) = Optimizer::default().optimize(record, &schema());
        assert!(!out.contains_key("routing_metadata"));
        assert!(!out.contains_key("weather_data"));
        assert_eq!(stats.fields_dropped.len(), 2);
    }

    #[test]
    fn bounds_waypoints_with_marker() {
        let mut record = ComputationState::new("c").to_record().unwrap();
        let waypoints: Vec<Value> = (0..100).map(|i| json!([i, i])).collect();
        record.insert(
            "route_data".into(),
            json!({ "distance_nm": 8288.0, "waypoints": waypoints }),
        );

        let (out, stats) = Optimizer::default().optimize(record, &schema());
        let kept = out["route_data"]["waypoints"].as_array().unwrap();
        assert_eq!(kept.len(), 10 + 1 + 5);
        assert_eq!(kept[10], json!({ "_omitted": 85 }));
        assert_eq!(kept[15], json!([99, 99]));
        assert_eq!(stats.arrays_bounded, 1);
    }

    #[test]
    fn optimized_state_still_loads_and_validates() {
        let mut state = ComputationState::new("c");
        state.messages.push(Message::user("x".repeat(5000)));
        state.reasoning_history = (1..=40).map(step).collect();
        state.domain.insert("price_data".into(), json!({ "vlsfo": 612.5, "notes": "" }));
        let record = state.to_record().unwrap();

        let (out, stats) = Optimizer::default().optimize(record, &schema());
        assert_eq!(stats.messages_truncated, 1);
        assert_eq!(out["messages"][0]["original_length"], json!(5000));
        assert_eq!(out["price_data"], json!({ "vlsfo": 612.5 }));

        let report = Validator::default().validate(&out, &schema());
        assert!(report.valid, "{}", report.summary());

        let loaded = ComputationState::from_record(out).unwrap();
        assert_eq!(loaded.reasoning_history.len(), 16);
        assert_eq!(loaded.reasoning_history[15].step_number, 40);
        assert!(loaded.messages[0].content.len() < 5000);
    }

    #[test]
    fn required_empty_fields_survive_stripping() {
        let record = ComputationState::new("c").to_record().unwrap();
        let (out, _) = Optimizer::default().optimize(record, &schema());
        assert!(out.contains_key("messages"));
        assert!(out.contains_key("agent_status"));
        assert!(out.contains_key("correlation_id"));
    }
}

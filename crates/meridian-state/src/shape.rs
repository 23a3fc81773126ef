//! Structural contracts for domain payloads.
//!
//! Domain values arrive as JSON from agents that do not share a schema, so
//! each domain type accepts any of several shapes. The capability traits
//! below name what the validator probes for; `conforms` maps a declared
//! `FieldType` onto them.

use serde_json::Value;

use meridian_contracts::schema::FieldType;

/// A route: something with a total distance.
pub trait HasDistance {
    fn distance_nm(&self) -> Option<f64>;
}

/// A route: something with an ordered waypoint list.
pub trait HasWaypoints {
    fn waypoints(&self) -> Option<&Vec<Value>>;
}

/// A weather payload: forecast points or a current-conditions summary.
pub trait HasForecast {
    fn has_forecast(&self) -> bool;
}

/// A port list, bare or wrapped.
pub trait HasPorts {
    fn ports(&self) -> Option<&Vec<Value>>;
}

/// A bunker analysis: a cost figure or ranked purchase options.
pub trait HasCost {
    fn has_cost(&self) -> bool;
}

/// A compliance payload: a verdict or the zones it evaluated.
pub trait HasComplianceStatus {
    fn has_compliance_status(&self) -> bool;
}

fn first_key<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| value.get(*k))
}

impl HasDistance for Value {
    fn distance_nm(&self) -> Option<f64> {
        first_key(
            self,
            &["distance_nm", "distance", "total_distance_nm", "totalDistance"],
        )
        .and_then(Value::as_f64)
    }
}

impl HasWaypoints for Value {
    fn waypoints(&self) -> Option<&Vec<Value>> {
        first_key(self, &["waypoints", "path", "coordinates"]).and_then(Value::as_array)
    }
}

impl HasForecast for Value {
    fn has_forecast(&self) -> bool {
        let listed = first_key(self, &["forecast", "forecasts", "points", "segments"])
            .is_some_and(Value::is_array);
        let summary = first_key(self, &["conditions", "summary", "wave_height_m", "wind_speed_kts"])
            .is_some();
        self.is_object() && (listed || summary)
    }
}

impl HasPorts for Value {
    fn ports(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            Value::Object(_) => first_key(self, &["ports", "results"]).and_then(Value::as_array),
            _ => None,
        }
    }
}

impl HasCost for Value {
    fn has_cost(&self) -> bool {
        let cost = first_key(self, &["total_cost_usd", "total_cost", "cost_usd"])
            .is_some_and(Value::is_number);
        let options = first_key(self, &["options", "recommendations", "ports"])
            .is_some_and(Value::is_array);
        self.is_object() && (cost || options)
    }
}

impl HasComplianceStatus for Value {
    fn has_compliance_status(&self) -> bool {
        let verdict = first_key(self, &["status", "compliant"])
            .is_some_and(|v| v.is_string() || v.is_boolean());
        let zones = first_key(self, &["zones", "eca_zones", "checks"]).is_some_and(Value::is_array);
        self.is_object() && (verdict || zones)
    }
}

fn is_message(value: &Value) -> bool {
    value.is_object() && value.get("content").is_some_and(Value::is_string)
}

/// Whether `value` satisfies the declared `field_type`.
pub fn conforms(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Array => value.is_array(),
        FieldType::Object => value.is_object(),
        FieldType::Messages => value
            .as_array()
            .is_some_and(|items| items.iter().all(is_message)),
        FieldType::Route => {
            value.is_object() && (value.distance_nm().is_some() || value.waypoints().is_some())
        }
        FieldType::Weather => value.has_forecast(),
        FieldType::Ports => value.ports().is_some(),
        FieldType::Bunker => value.has_cost(),
        FieldType::Compliance => value.has_compliance_status(),
        FieldType::Any => true,
    }
}

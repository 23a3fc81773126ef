//! Validation pass: state record vs. schema.
//!
//! `validate` runs every check; `validate_sizes` is the reduced form used on
//! the checkpoint write path, where fields may already be reference tokens
//! or display-optimized.
//!
//! Checks, in order:
//!
//!   1. Nesting depth (cycle condition, always fatal)
//!   2. Required fields present and non-null
//!   3. Per-field: unknown / deprecated (warnings), null, declared type
//!   4. Per-field serialized size against soft and hard thresholds
//!   5. Total serialized size against the budget

use serde_json::{Map, Value};
use tracing::debug;

use meridian_contracts::{
    schema::{StateSchema, SCHEMA_VERSION_FIELD},
    validation::{IssueKind, ValidationReport},
};

use crate::compress::is_reference;
use crate::limits::LifecycleLimits;
use crate::shape::conforms;

#[derive(Debug, Clone, Default)]
pub struct Validator {
    limits: LifecycleLimits,
}

impl Validator {
    pub fn new(limits: LifecycleLimits) -> Self {
        Self { limits }
    }

    pub fn validate(&self, record: &Map<String, Value>, schema: &StateSchema) -> ValidationReport {
        let mut report = ValidationReport::new();
        self.check_depth(record, &mut report);

        for spec in schema.required_fields() {
            match record.get(&spec.name) {
                None => report.error(
                    Some(&spec.name),
                    IssueKind::MissingRequired,
                    "required field is missing",
                ),
                Some(Value::Null) => report.error(
                    Some(&spec.name),
                    IssueKind::NullNotAllowed,
                    "required field is null",
                ),
                Some(_) => {}
            }
        }

        for (name, value) in record {
            if name == SCHEMA_VERSION_FIELD {
                if !value.is_string() {
                    report.error(Some(name), IssueKind::TypeMismatch, "schema tag must be a string");
                }
                continue;
            }
            let Some(spec) = schema.field(name) else {
                report.warn(Some(name), IssueKind::UnknownField, "field not declared by schema");
                continue;
            };
            if spec.deprecated {
                report.warn(Some(name), IssueKind::DeprecatedField, "field is deprecated");
            }
            if value.is_null() {
                if !spec.nullable && !spec.required {
                    report.error(Some(name), IssueKind::NullNotAllowed, "field is not nullable");
                }
                continue;
            }
            if is_reference(value).is_some() {
                continue;
            }
            if !conforms(spec.field_type, value) {
                report.error(
                    Some(name),
                    IssueKind::TypeMismatch,
                    format!("value does not match declared type {:?}", spec.field_type),
                );
            }
        }

        self.check_sizes(record, schema, &mut report);
        debug!(
            schema = %schema.version,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "state validated"
        );
        report
    }

    /// Depth and size checks only.
    pub fn validate_sizes(&self, record: &Map<String, Value>, schema: &StateSchema) -> ValidationReport {
        let mut report = ValidationReport::new();
        self.check_depth(record, &mut report);
        self.check_sizes(record, schema, &mut report);
        report
    }

    fn check_depth(&self, record: &Map<String, Value>, report: &mut ValidationReport) {
        for (name, value) in record {
            if exceeds_depth(value, self.limits.max_nesting_depth) {
                report.error(
                    Some(name),
                    IssueKind::CycleDetected,
                    format!(
                        "nesting deeper than {} levels, treated as a reference cycle",
                        self.limits.max_nesting_depth
                    ),
                );
            }
        }
    }

    fn check_sizes(&self, record: &Map<String, Value>, schema: &StateSchema, report: &mut ValidationReport) {
        let mut total = 0usize;
        for (name, value) in record {
            let size = serialized_size(value);
            total += size;
            let hard = schema
                .field(name)
                .map(|s| s.max_size)
                .filter(|m| *m > 0)
                .unwrap_or(self.limits.field_hard_limit_bytes);
            if size > hard {
                report.error(
                    Some(name),
                    IssueKind::FieldTooLarge,
                    format!("{size} bytes exceeds hard limit of {hard} bytes"),
                );
            } else if size > self.limits.field_soft_limit_bytes {
                report.warn(
                    Some(name),
                    IssueKind::FieldLarge,
                    format!(
                        "{size} bytes exceeds soft limit of {} bytes",
                        self.limits.field_soft_limit_bytes
                    ),
                );
            }
        }
        if total > self.limits.total_budget_bytes {
            report.error(
                None,
                IssueKind::TotalBudgetExceeded,
                format!(
                    "state is {total} bytes, budget is {} bytes",
                    self.limits.total_budget_bytes
                ),
            );
        }
    }
}

/// Compact JSON length of `value` in bytes.
pub fn serialized_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

/// Total compact JSON length of a record.
pub fn record_size(record: &Map<String, Value>) -> usize {
    serde_json::to_vec(record).map(|v| v.len()).unwrap_or(0)
}

fn exceeds_depth(value: &Value, limit: usize) -> bool {
    let mut pending: Vec<(&Value, usize)> = vec![(value, 1)];
    while let Some((v, depth)) = pending.pop() {
        if depth > limit {
            return true;
        }
        match v {
            Value::Array(items) => pending.extend(items.iter().map(|i| (i, depth + 1))),
            Value::Object(map) => pending.extend(map.values().map(|i| (i, depth + 1))),
            _ => {}
        }
    }
    false
}

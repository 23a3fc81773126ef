//! State validation report types.
//!
//! The lifecycle validator checks a state record against a `StateSchema` and
//! returns a `ValidationReport`. Errors make the record invalid; warnings are
//! informational and never block a checkpoint.

use serde::{Deserialize, Serialize};

/// Classification of a single validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingRequired,
    NullNotAllowed,
    TypeMismatch,
    /// Above the soft threshold (warning).
    FieldLarge,
    /// Above the hard threshold (error).
    FieldTooLarge,
    UnknownField,
    DeprecatedField,
    TotalBudgetExceeded,
    /// Always fatal.
    CycleDetected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// The offending field, absent for record-wide issues.
    pub field: Option<String>,
    pub kind: IssueKind,
    pub message: String,
}

/// The outcome of validating one state record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True only if `errors` is empty.
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, field: Option<&str>, kind: IssueKind, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationIssue {
            field: field.map(str::to_string),
            kind,
            message: message.into(),
        });
    }

    pub fn warn(&mut self, field: Option<&str>, kind: IssueKind, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            field: field.map(str::to_string),
            kind,
            message: message.into(),
        });
    }

    /// True when an error is not attributable to a single field.
    pub fn has_record_level_error(&self) -> bool {
        self.errors.iter().any(|e| e.field.is_none())
    }

    /// Field names that carry at least one error.
    pub fn failing_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|e| e.field.as_deref())
            .collect();
        fields.sort_unstable();
        fields.dedup();
        fields
    }

    pub fn has_error_kind(&self, kind: IssueKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    pub fn has_warning_kind(&self, kind: IssueKind) -> bool {
        self.warnings.iter().any(|e| e.kind == kind)
    }

    /// `[field] message; [field] message` summary for error values and logs.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("[{}] {}", e.field.as_deref().unwrap_or("*"), e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

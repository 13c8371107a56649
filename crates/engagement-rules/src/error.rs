//! Error types for the engagement rule engine

use crate::model::{ActionType, ConditionField, Operator};
use thiserror::Error;

/// Errors returned by rule store operations
#[derive(Error, Debug)]
pub enum RuleError {
    /// A rule field violates an invariant; the rule was not stored
    #[error("Invalid rule: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Rule not found
    #[error("Rule not found: {0}")]
    NotFound(String),

    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuleError {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A condition could not be evaluated against an event.
///
/// Never fatal: the condition counts as a non-match and the owning rule is
/// skipped for that event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// The operator cannot be applied to the field's type
    #[error("Operator {operator:?} cannot be applied to field {field:?}")]
    UnsupportedOperator {
        field: ConditionField,
        operator: Operator,
    },

    /// The condition value cannot be read as the field's type
    #[error("Value {value:?} is not valid for field {field:?}")]
    InvalidValue { field: ConditionField, value: String },

    /// The operator needs a value and the condition has none
    #[error("Operator {operator:?} on field {field:?} requires a value")]
    MissingValue {
        field: ConditionField,
        operator: Operator,
    },
}

/// A matched rule could not be turned into a dispatch command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Action type needs a value (template, tag, assignee) and has none
    #[error("Action {0:?} requires a value")]
    MissingActionValue(ActionType),

    /// Delay pushes the execution time past the last representable date
    #[error("Scheduled delay is out of range")]
    DelayOutOfRange,
}

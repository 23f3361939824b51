use thiserror::Error;

use super::custom::{EvalError, ExprError};

/// Configuration errors found while compiling a rule set.
///
/// Each variant names the offending rule or column.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("custom rule '{rule}' is invalid: {source}")]
    InvalidExpression {
        rule: String,
        #[source]
        source: ExprError,
    },

    #[error("invalid date format '{format}' for rule '{rule}'")]
    InvalidDateFormat { rule: String, format: String },

    #[error("rule '{0}' is defined more than once")]
    DuplicateRule(String),
}

/// Reasons a rule could not be evaluated against a dataset.
///
/// Never escapes the engine: each one becomes a single error finding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleFailure {
    #[error("column(s) not found: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),

    #[error("rule panicked: {0}")]
    Panicked(String),
}

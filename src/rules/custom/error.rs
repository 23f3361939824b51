use thiserror::Error;

/// Errors found while parsing a rule expression.
///
/// These are configuration errors: the run stops before any data is read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated quote starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid number '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    #[error("expected {expected}, found {found} at offset {offset}")]
    UnexpectedToken {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("expected {expected}, found end of expression")]
    UnexpectedEnd { expected: String },

    #[error("unknown function '{name}' at offset {offset}")]
    UnknownFunction { name: String, offset: usize },

    #[error("function '{name}' takes {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("column '{name}' at offset {offset} is not listed in the rule's columns")]
    UndeclaredColumn { name: String, offset: usize },

    #[error("matches() needs a string literal pattern")]
    PatternNotLiteral,

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Errors raised while evaluating a rule expression against a row.
///
/// Contained by the rule engine and recorded as a finding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("'{func}' expects {expected}, got {found}")]
    BadArgument {
        func: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow in '{op}'")]
    Overflow { op: &'static str },

    #[error("expression returned {found}, expected a boolean")]
    NotBoolean { found: &'static str },

    #[error("evaluation exceeded the budget of {limit} steps")]
    BudgetExhausted { limit: u64 },

    #[error("evaluation exceeded the time budget of {limit_ms} ms")]
    DeadlineExceeded { limit_ms: u128 },
}

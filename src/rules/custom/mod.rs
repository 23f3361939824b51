//! User-supplied rules written in a small predicate language.
//!
//! Expressions are parsed once when the rule set is built and evaluated by
//! an interpreter that can only read the columns a rule declares.

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;
mod rule;

pub use error::{EvalError, ExprError};
pub use eval::DEFAULT_STEP_BUDGET;
pub use rule::CustomRule;

use std::time::Instant;

use crate::domain::{CustomRuleDef, RuleOrigin, Severity, ValidationFinding, Value};
use crate::rules::{RuleContext, RuleFailure};

use super::ast::Expr;
use super::error::{EvalError, ExprError};
use super::eval::Evaluator;
use super::parser::parse_expr;

/// A compiled user-supplied rule.
#[derive(Debug, Clone)]
pub struct CustomRule {
    name: String,
    columns: Vec<String>,
    severity: Severity,
    message: String,
    origin: RuleOrigin,
    source: String,
    date_format: String,
    expr: Expr,
}

impl CustomRule {
    /// Parse a rule definition. The message defaults to the rule name.
    pub fn compile(
        name: impl Into<String>,
        def: &CustomRuleDef,
        origin: RuleOrigin,
        date_format: &str,
    ) -> Result<Self, ExprError> {
        let name = name.into();
        let expr = parse_expr(&def.func, &def.columns)?;
        let message = def.message.clone().unwrap_or_else(|| name.clone());

        Ok(CustomRule {
            name,
            columns: def.columns.clone(),
            severity: def.severity,
            message,
            origin,
            source: def.func.clone(),
            date_format: date_format.to_string(),
            expr,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn origin(&self) -> RuleOrigin {
        self.origin
    }

    /// The expression as written in configuration.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the rule over every row.
    ///
    /// Stops at the first runtime error or when the deadline passes; a
    /// partial result is never returned.
    pub fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<ValidationFinding>, RuleFailure> {
        let slots = ctx
            .dataset
            .resolve_columns(&self.columns)
            .map_err(RuleFailure::MissingColumns)?;

        let started = Instant::now();
        let mut evaluator = Evaluator::new(&self.date_format, ctx.limits.max_steps);
        let mut findings = Vec::new();

        for (i, row) in ctx.dataset.rows().iter().enumerate() {
            if started.elapsed() >= ctx.limits.timeout {
                return Err(EvalError::DeadlineExceeded {
                    limit_ms: ctx.limits.timeout.as_millis(),
                }
                .into());
            }

            let values: Vec<&Value> = slots.iter().map(|&c| &row[c]).collect();
            if evaluator.eval_row(&self.expr, &values)? {
                findings.push(ValidationFinding::row(
                    &self.name,
                    self.severity,
                    self.origin,
                    ctx.keys[i].clone(),
                    &self.message,
                ));
            }
        }

        Ok(findings)
    }
}

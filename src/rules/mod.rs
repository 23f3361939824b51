pub mod builtin;
pub mod custom;
pub mod engine;
pub mod error;

pub use builtin::{BuiltInKind, BuiltInRule};
pub use custom::{CustomRule, EvalError, ExprError};
pub use engine::RuleEngine;
pub use error::{RuleError, RuleFailure};

use chrono::format::{Item, StrftimeItems};
use std::time::Duration;

use crate::domain::{
    AuditSettings, CustomRuleDef, Dataset, RowKey, RuleOrigin, Severity, ValidationFinding,
};

/// Default wall-clock budget for one custom rule.
pub const DEFAULT_RULE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Bounds applied to every custom rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalLimits {
    /// Wall-clock budget per rule over the whole dataset
    pub timeout: Duration,
    /// Expression nodes visited per row
    pub max_steps: u64,
}

impl Default for EvalLimits {
    fn default() -> Self {
        EvalLimits {
            timeout: DEFAULT_RULE_TIMEOUT,
            max_steps: custom::DEFAULT_STEP_BUDGET,
        }
    }
}

/// Everything a rule reads while it runs.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub dataset: &'a Dataset,
    /// Key of each row, aligned with `dataset.rows()`
    pub keys: &'a [RowKey],
    pub limits: &'a EvalLimits,
}

impl<'a> RuleContext<'a> {
    pub fn new(dataset: &'a Dataset, keys: &'a [RowKey], limits: &'a EvalLimits) -> Self {
        RuleContext {
            dataset,
            keys,
            limits,
        }
    }
}

/// A validation rule.
#[derive(Debug, Clone)]
pub enum Rule {
    BuiltIn(BuiltInRule),
    Custom(CustomRule),
}

impl Rule {
    pub fn name(&self) -> &str {
        match self {
            Rule::BuiltIn(rule) => &rule.name,
            Rule::Custom(rule) => rule.name(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Rule::BuiltIn(rule) => rule.severity,
            Rule::Custom(rule) => rule.severity(),
        }
    }

    pub fn origin(&self) -> RuleOrigin {
        match self {
            Rule::BuiltIn(_) => RuleOrigin::BuiltIn,
            Rule::Custom(rule) => rule.origin(),
        }
    }

    /// Evaluate the rule. Failures are returned, not recorded.
    pub fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<ValidationFinding>, RuleFailure> {
        match self {
            Rule::BuiltIn(rule) => rule.check(ctx),
            Rule::Custom(rule) => rule.check(ctx),
        }
    }
}

/// Collection of compiled rules in evaluation order.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    primary_keys: Vec<String>,
    date_format: String,
}

impl RuleSet {
    /// Build built-in and custom rules from audit settings.
    ///
    /// Built-ins come first in their fixed order, then custom rules in
    /// configuration order.
    pub fn from_settings(settings: &AuditSettings) -> Result<Self, RuleError> {
        let validator = &settings.validator;

        if !is_valid_date_format(&validator.date_format) {
            return Err(RuleError::InvalidDateFormat {
                rule: "date_format".to_string(),
                format: validator.date_format.clone(),
            });
        }

        let mut ruleset = RuleSet {
            rules: BuiltInRule::from_settings(&settings.primary_keys, validator)
                .into_iter()
                .map(Rule::BuiltIn)
                .collect(),
            primary_keys: settings.primary_keys.clone(),
            date_format: validator.date_format.clone(),
        };

        for (name, def) in &validator.custom_rules {
            ruleset.add_custom(name, def, RuleOrigin::Custom)?;
        }

        Ok(ruleset)
    }

    /// Create an empty rule set.
    pub fn empty(primary_keys: Vec<String>) -> Self {
        RuleSet {
            rules: Vec::new(),
            primary_keys,
            date_format: crate::domain::value::ISO_DATE.to_string(),
        }
    }

    /// Compile and append a custom rule.
    pub fn add_custom(
        &mut self,
        name: &str,
        def: &CustomRuleDef,
        origin: RuleOrigin,
    ) -> Result<(), RuleError> {
        if self.rules.iter().any(|r| r.name() == name) {
            return Err(RuleError::DuplicateRule(name.to_string()));
        }

        let rule = CustomRule::compile(name, def, origin, &self.date_format).map_err(|source| {
            RuleError::InvalidExpression {
                rule: name.to_string(),
                source,
            }
        })?;
        self.rules.push(Rule::Custom(rule));
        Ok(())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn is_valid_date_format(format: &str) -> bool {
    !format.is_empty() && !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

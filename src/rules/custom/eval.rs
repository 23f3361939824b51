use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::domain::value::ISO_DATE;
use crate::domain::Value;

use super::ast::{BinaryOp, Expr, Function, UnaryOp};
use super::error::EvalError;

/// Default number of expression nodes a single row may visit.
pub const DEFAULT_STEP_BUDGET: u64 = 10_000;

/// Tree-walking interpreter for rule expressions.
///
/// Has no access to anything but the row slice it is handed: no I/O,
/// no environment, no loops. Each call to [`Evaluator::eval_row`] is
/// bounded by the step budget.
#[derive(Debug)]
pub struct Evaluator<'a> {
    date_format: &'a str,
    max_steps: u64,
    steps: u64,
}

impl<'a> Evaluator<'a> {
    /// Create a new evaluator that parses text dates with `date_format`.
    pub fn new(date_format: &'a str, max_steps: u64) -> Self {
        Evaluator {
            date_format,
            max_steps,
            steps: 0,
        }
    }

    /// Evaluate a rule predicate against one row.
    ///
    /// `true` means the row violates the rule. `false` and null do not.
    pub fn eval_row(&mut self, expr: &Expr, row: &[&Value]) -> Result<bool, EvalError> {
        self.steps = 0;
        match self.eval(expr, row)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(EvalError::NotBoolean {
                found: other.type_name(),
            }),
        }
    }

    /// Evaluate an expression to a value.
    pub fn eval(&mut self, expr: &Expr, row: &[&Value]) -> Result<Value, EvalError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(EvalError::BudgetExhausted {
                limit: self.max_steps,
            });
        }

        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column(slot) => Ok(row.get(*slot).map(|v| (*v).clone()).unwrap_or(Value::Null)),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr, row)?;
                unary(*op, value)
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And => self.and(left, right, row),
                BinaryOp::Or => self.or(left, right, row),
                _ => {
                    let l = self.eval(left, row)?;
                    let r = self.eval(right, row)?;
                    self.binary(*op, l, r)
                }
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let value = self.eval(expr, row)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut found = false;
                for item in list {
                    let item = self.eval(item, row)?;
                    if self.loosely_equal(&value, &item) {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Bool(found != *negated))
            }
            Expr::IsNull { expr, negated } => {
                let value = self.eval(expr, row)?;
                Ok(Value::Bool(value.is_null() != *negated))
            }
            Expr::Call { func, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, row)?);
                }
                self.call(*func, values)
            }
            Expr::Matches { expr, pattern } => match self.eval(expr, row)? {
                Value::Null => Ok(Value::Null),
                Value::Text(s) => Ok(Value::Bool(pattern.is_match(&s))),
                other => Err(EvalError::BadArgument {
                    func: "matches",
                    expected: "text",
                    found: other.type_name(),
                }),
            },
        }
    }

    fn and(&mut self, left: &Expr, right: &Expr, row: &[&Value]) -> Result<Value, EvalError> {
        let l = truth(BinaryOp::And, self.eval(left, row)?)?;
        if l == Some(false) {
            return Ok(Value::Bool(false));
        }
        let r = truth(BinaryOp::And, self.eval(right, row)?)?;
        Ok(match (l, r) {
            (_, Some(false)) => Value::Bool(false),
            (Some(true), Some(true)) => Value::Bool(true),
            _ => Value::Null,
        })
    }

    fn or(&mut self, left: &Expr, right: &Expr, row: &[&Value]) -> Result<Value, EvalError> {
        let l = truth(BinaryOp::Or, self.eval(left, row)?)?;
        if l == Some(true) {
            return Ok(Value::Bool(true));
        }
        let r = truth(BinaryOp::Or, self.eval(right, row)?)?;
        Ok(match (l, r) {
            (_, Some(true)) => Value::Bool(true),
            (Some(false), Some(false)) => Value::Bool(false),
            _ => Value::Null,
        })
    }

    fn binary(&self, op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
        if l.is_null() || r.is_null() {
            return Ok(Value::Null);
        }

        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arithmetic(op, &l, &r),
            _ => {
                let ordering = self.order(op, &l, &r)?;
                let result = match op {
                    BinaryOp::Eq => ordering == Ordering::Equal,
                    BinaryOp::Ne => ordering != Ordering::Equal,
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok(Value::Bool(result))
            }
        }
    }

    /// Order two non-null values of the same type. Text compared with a
    /// date is parsed as a date first.
    fn order(&self, op: BinaryOp, l: &Value, r: &Value) -> Result<Ordering, EvalError> {
        let mismatch = || EvalError::TypeMismatch {
            op: op.symbol(),
            left: l.type_name(),
            right: r.type_name(),
        };

        match (l, r) {
            (Value::Date(d), Value::Text(s)) => {
                let other = self.parse_date(s).ok_or_else(mismatch)?;
                Ok(d.cmp(&other))
            }
            (Value::Text(s), Value::Date(d)) => {
                let other = self.parse_date(s).ok_or_else(mismatch)?;
                Ok(other.cmp(d))
            }
            _ => l.compare(r).ok_or_else(mismatch),
        }
    }

    /// Membership test used by `in`. Values of different types match when
    /// their canonical text does.
    fn loosely_equal(&self, value: &Value, item: &Value) -> bool {
        if item.is_null() {
            return false;
        }
        match value.compare(item) {
            Some(ordering) => ordering == Ordering::Equal,
            None => value.canonical() == item.canonical(),
        }
    }

    fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        NaiveDate::parse_from_str(text, self.date_format)
            .or_else(|_| NaiveDate::parse_from_str(text, ISO_DATE))
            .ok()
    }

    fn date_arg(&self, func: Function, value: &Value) -> Result<Option<NaiveDate>, EvalError> {
        match value {
            Value::Null => Ok(None),
            Value::Date(d) => Ok(Some(*d)),
            Value::Text(s) => self
                .parse_date(s)
                .map(Some)
                .ok_or(EvalError::BadArgument {
                    func: func.name(),
                    expected: "a date",
                    found: "unparseable text",
                }),
            other => Err(EvalError::BadArgument {
                func: func.name(),
                expected: "a date",
                found: other.type_name(),
            }),
        }
    }

    fn call(&self, func: Function, mut args: Vec<Value>) -> Result<Value, EvalError> {
        if func == Function::Coalesce {
            return Ok(args
                .into_iter()
                .find(|v| !v.is_null())
                .unwrap_or(Value::Null));
        }
        if func == Function::DaysBetween {
            let [start, end] = args.as_slice() else {
                return Ok(Value::Null);
            };
            let start = self.date_arg(func, start)?;
            let end = self.date_arg(func, end)?;
            return Ok(match (start, end) {
                (Some(start), Some(end)) => Value::from((end - start).num_days()),
                _ => Value::Null,
            });
        }

        let arg = args.pop().unwrap_or(Value::Null);
        if arg.is_null() {
            return Ok(Value::Null);
        }

        let bad = |expected: &'static str, found: &Value| EvalError::BadArgument {
            func: func.name(),
            expected,
            found: found.type_name(),
        };

        match func {
            Function::Len => match &arg {
                Value::Text(s) => Ok(Value::from(s.chars().count() as i64)),
                other => Err(bad("text", other)),
            },
            Function::Lower => match arg {
                Value::Text(s) => Ok(Value::Text(s.to_lowercase())),
                other => Err(bad("text", &other)),
            },
            Function::Upper => match arg {
                Value::Text(s) => Ok(Value::Text(s.to_uppercase())),
                other => Err(bad("text", &other)),
            },
            Function::Trim => match arg {
                Value::Text(s) => Ok(Value::Text(s.trim().to_string())),
                other => Err(bad("text", &other)),
            },
            Function::Abs => match arg {
                Value::Number(n) => Ok(Value::Number(n.abs())),
                other => Err(bad("a number", &other)),
            },
            Function::Year => {
                let date = self.date_arg(func, &arg)?;
                Ok(date.map(|d| Value::from(d.year())).unwrap_or(Value::Null))
            }
            Function::Date => match arg {
                Value::Date(d) => Ok(Value::Date(d)),
                Value::Text(s) => Ok(self.parse_date(&s).map(Value::Date).unwrap_or(Value::Null)),
                other => Err(bad("text or a date", &other)),
            },
            Function::DaysBetween | Function::Coalesce => Ok(Value::Null),
        }
    }
}

fn truth(op: BinaryOp, value: Value) -> Result<Option<bool>, EvalError> {
    match value {
        Value::Bool(b) => Ok(Some(b)),
        Value::Null => Ok(None),
        other => Err(EvalError::TypeMismatch {
            op: op.symbol(),
            left: other.type_name(),
            right: "boolean",
        }),
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Not, other) => Err(EvalError::BadArgument {
            func: "not",
            expected: "a boolean",
            found: other.type_name(),
        }),
        (UnaryOp::Neg, other) => Err(EvalError::BadArgument {
            func: "-",
            expected: "a number",
            found: other.type_name(),
        }),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    let (Some(a), Some(b)) = (l.as_decimal(), r.as_decimal()) else {
        return Err(EvalError::TypeMismatch {
            op: op.symbol(),
            left: l.type_name(),
            right: r.type_name(),
        });
    };

    let result: Option<Decimal> = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        _ => {
            if b.is_zero() {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_div(b)
        }
    };

    result
        .map(Value::Number)
        .ok_or(EvalError::Overflow { op: op.symbol() })
}

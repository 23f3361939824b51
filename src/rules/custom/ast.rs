use regex::Regex;

use crate::domain::Value;

/// Parsed rule expression.
///
/// Columns are bound to slots in the rule's declared column list at parse
/// time, so evaluation never looks anything up by name.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Column(usize),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
    Matches {
        expr: Box<Expr>,
        pattern: Regex,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Whitelisted functions. Nothing else is callable from a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Len,
    Lower,
    Upper,
    Trim,
    Abs,
    Year,
    Date,
    DaysBetween,
    Coalesce,
}

impl Function {
    pub fn lookup(name: &str) -> Option<Function> {
        match name.to_ascii_lowercase().as_str() {
            "len" => Some(Function::Len),
            "lower" => Some(Function::Lower),
            "upper" => Some(Function::Upper),
            "trim" => Some(Function::Trim),
            "abs" => Some(Function::Abs),
            "year" => Some(Function::Year),
            "date" => Some(Function::Date),
            "days_between" => Some(Function::DaysBetween),
            "coalesce" => Some(Function::Coalesce),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Len => "len",
            Function::Lower => "lower",
            Function::Upper => "upper",
            Function::Trim => "trim",
            Function::Abs => "abs",
            Function::Year => "year",
            Function::Date => "date",
            Function::DaysBetween => "days_between",
            Function::Coalesce => "coalesce",
        }
    }

    /// Accepted argument counts, `None` for variadic.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Function::DaysBetween => Some(2),
            Function::Coalesce => None,
            _ => Some(1),
        }
    }
}

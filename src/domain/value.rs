use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// ISO-8601 calendar date, the canonical rendering of [`Value::Date`].
pub const ISO_DATE: &str = "%Y-%m-%d";

/// A single typed cell.
///
/// Numbers are exact decimals so premiums, percentiles and diffs never
/// pick up floating point noise.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Decimal),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Number(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The column type this value belongs to, `None` for null.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Number(_) => Some(ColumnType::Number),
            Value::Date(_) => Some(ColumnType::Date),
            Value::Text(_) => Some(ColumnType::Text),
        }
    }

    /// Human readable type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Date(_) => "date",
            Value::Text(_) => "text",
        }
    }

    /// Canonical text form used for keys and category counting.
    ///
    /// Numbers are normalized (`100.00` and `100` render the same), dates
    /// are ISO-8601 and null is the empty string.
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(d) => d.normalize().to_string(),
            Value::Date(d) => d.format(ISO_DATE).to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    /// Ordering between two values of the same type.
    ///
    /// Returns `None` when either side is null or the types differ.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            other => write!(f, "{}", other.canonical()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Decimal::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Decimal::from(n))
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Number(d)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Inferred type of a dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Every value is null
    Empty,
    Text,
    Number,
    Date,
    Boolean,
}

impl ColumnType {
    /// Infer a column type from its values.
    ///
    /// The column takes the single type shared by all non-null values;
    /// mixed columns fall back to text.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
        let mut inferred = ColumnType::Empty;
        for value in values {
            let Some(ty) = value.column_type() else {
                continue;
            };
            if inferred == ColumnType::Empty {
                inferred = ty;
            } else if inferred != ty {
                return ColumnType::Text;
            }
        }
        inferred
    }

    /// Whether outliers on this column are measured on a numeric scale.
    pub fn is_ordinal(&self) -> bool {
        matches!(self, ColumnType::Number | ColumnType::Date)
    }

    /// Whether this column is analysed by category frequency.
    pub fn is_categorical(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Boolean)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Empty => write!(f, "empty"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Number => write!(f, "number"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Boolean => write!(f, "boolean"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_normalizes_numbers() {
        assert_eq!(Value::Number(Decimal::new(10000, 2)).canonical(), "100");
        assert_eq!(Value::from(100).canonical(), "100");
        assert_eq!(Value::Null.canonical(), "");
    }

    #[test]
    fn test_numeric_equality_ignores_scale() {
        assert_eq!(Value::Number(Decimal::new(1050, 2)), Value::Number(Decimal::new(105, 1)));
        assert_ne!(Value::from("100"), Value::from(100));
    }

    #[test]
    fn test_compare_same_type_only() {
        assert_eq!(Value::from(1).compare(&Value::from(2)), Some(Ordering::Less));
        assert_eq!(Value::from("b").compare(&Value::from("a")), Some(Ordering::Greater));
        assert_eq!(Value::from(1).compare(&Value::from("1")), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_infer_column_type() {
        let numbers = [Value::from(1), Value::Null, Value::from(3)];
        assert_eq!(ColumnType::infer(&numbers), ColumnType::Number);

        let mixed = [Value::from(1), Value::from("x")];
        assert_eq!(ColumnType::infer(&mixed), ColumnType::Text);

        let empty = [Value::Null, Value::Null];
        assert_eq!(ColumnType::infer(&empty), ColumnType::Empty);
    }

    #[test]
    fn test_value_serialization() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(serde_json::to_string(&Value::from(date)).unwrap(), "\"2024-03-01\"");
        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Value::from(true)).unwrap(), "true");
    }
}

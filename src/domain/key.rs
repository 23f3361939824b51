use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;

use super::value::Value;

/// Separator between components of a composite key.
pub const KEY_SEPARATOR: char = '|';

/// Primary key of a policy row.
///
/// Holds the canonical text of each key column so that `100` and `100.00`
/// identify the same policy. Most books key on a single column, hence the
/// inline capacity of one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(SmallVec<[String; 1]>);

impl RowKey {
    /// Build a key from the values of the key columns.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        RowKey(values.into_iter().map(Value::canonical).collect())
    }

    /// Fallback identifier for a row when the key columns are absent.
    pub fn ordinal(row: usize) -> Self {
        RowKey(SmallVec::from_elem(format!("#{row}"), 1))
    }

    /// Key components in key column order.
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{KEY_SEPARATOR}")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl Serialize for RowKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<&str> for RowKey {
    fn from(s: &str) -> Self {
        RowKey(s.split(KEY_SEPARATOR).map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_key_from_values() {
        let values = [Value::from("P1"), Value::Number(Decimal::new(2000, 1))];
        let key = RowKey::from_values(&values);
        assert_eq!(key.parts(), &["P1".to_string(), "200".to_string()]);
        assert_eq!(key.to_string(), "P1|200");
        assert_eq!(key, RowKey::from("P1|200"));
    }

    #[test]
    fn test_ordinal_key() {
        assert_eq!(RowKey::ordinal(7).to_string(), "#7");
    }

    #[test]
    fn test_key_serializes_as_string() {
        let json = serde_json::to_string(&RowKey::from("P9")).unwrap();
        assert_eq!(json, "\"P9\"");
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::key::RowKey;
use super::value::Value;

/// Which reconciliation categories are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    /// New, lapsed and retained
    #[default]
    Outer,
    /// Retained only
    Inner,
    /// New and retained
    Left,
    /// Lapsed and retained
    Right,
}

impl JoinType {
    pub fn includes_new(&self) -> bool {
        matches!(self, JoinType::Outer | JoinType::Left)
    }

    pub fn includes_lapsed(&self) -> bool {
        matches!(self, JoinType::Outer | JoinType::Right)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Outer => write!(f, "outer"),
            JoinType::Inner => write!(f, "inner"),
            JoinType::Left => write!(f, "left"),
            JoinType::Right => write!(f, "right"),
        }
    }
}

/// Old and new value of a changed field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub previous: Value,
    pub current: Value,
}

/// Changed fields of one retained policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyChanges {
    pub key: RowKey,
    pub fields: BTreeMap<String, FieldChange>,
}

/// Result of reconciling the current snapshot against the previous one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub join_type: JoinType,
    pub total_current: usize,
    pub total_previous: usize,

    /// Keys only in current, in current row order; `None` when the join
    /// type does not compute them
    pub new: Option<Vec<RowKey>>,

    /// Keys only in previous, in previous row order
    pub lapsed: Option<Vec<RowKey>>,

    /// Keys in both, in current row order
    pub retained: Vec<RowKey>,

    /// `retained / total_previous`, `0` when there is no previous book
    pub retention_rate: f64,

    /// Set when the previous snapshot was empty and the rate is the
    /// fallback `0` rather than a measured value
    pub retention_undefined: bool,

    /// Changed fields for retained keys; `None` when change tracking is off
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<KeyChanges>>,
}

impl ComparisonReport {
    pub fn new_count(&self) -> Option<usize> {
        self.new.as_ref().map(Vec::len)
    }

    pub fn lapsed_count(&self) -> Option<usize> {
        self.lapsed.as_ref().map(Vec::len)
    }

    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    /// Retention rate as a percentage.
    pub fn retention_percent(&self) -> f64 {
        self.retention_rate * 100.0
    }

    /// Changed fields recorded for a key, if any.
    pub fn changes_for(&self, key: &RowKey) -> Option<&BTreeMap<String, FieldChange>> {
        self.changes
            .as_ref()?
            .iter()
            .find(|c| &c.key == key)
            .map(|c| &c.fields)
    }

    /// Number of retained keys with at least one changed field.
    pub fn changed_count(&self) -> usize {
        self.changes.as_ref().map_or(0, Vec::len)
    }
}

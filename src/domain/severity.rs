use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a validation finding.
///
/// Ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported, does not count towards errors
    Warning,
    /// Counts towards the error total
    #[default]
    Error,
}

impl Severity {
    #[inline]
    pub fn is_error(&self) -> bool {
        *self == Severity::Error
    }

    #[inline]
    pub fn is_warning(&self) -> bool {
        *self == Severity::Warning
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

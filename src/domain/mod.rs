pub mod comparison;
pub mod dataset;
pub mod key;
pub mod outlier;
pub mod settings;
pub mod severity;
pub mod validation;
pub mod value;

pub use comparison::{ComparisonReport, FieldChange, JoinType, KeyChanges};
pub use dataset::{Dataset, DatasetError, RowView};
pub use key::RowKey;
pub use outlier::{
    FlaggedRow, OutlierFinding, OutlierReason, OutlierReport, OutlierSummary, RareValue, TailBounds,
};
pub use settings::{
    AuditSettings, ComparisonSettings, CustomRuleDef, DateOrder, Encoding, LoaderSettings,
    OutlierSettings, SuggestSettings, ValidatorSettings,
};
pub use severity::Severity;
pub use validation::{RuleOrigin, RuleSummary, ValidationFinding, ValidationReport};
pub use value::{ColumnType, Value};

use ahash::AHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{
    ComparisonReport, ComparisonSettings, Dataset, FieldChange, JoinType, KeyChanges, RowKey,
};
use crate::observability::MetricsRegistry;

/// Which input a reconciliation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    Current,
    Previous,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snapshot::Current => write!(f, "current"),
            Snapshot::Previous => write!(f, "previous"),
        }
    }
}

/// Precondition violations that stop reconciliation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("primary key column '{column}' is missing from the {snapshot} snapshot")]
    MissingKeyColumn { snapshot: Snapshot, column: String },

    #[error("duplicate primary key '{key}' in the {snapshot} snapshot")]
    DuplicateKey { snapshot: Snapshot, key: RowKey },

    #[error("no primary key columns configured")]
    NoPrimaryKey,
}

/// Joins two snapshots on the primary key.
#[derive(Debug, Clone)]
pub struct Reconciler {
    primary_keys: Vec<String>,
    join_type: JoinType,
    track_changes: bool,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(primary_keys: &[String], join_type: JoinType, track_changes: bool) -> Self {
        Reconciler {
            primary_keys: primary_keys.to_vec(),
            join_type,
            track_changes,
            metrics: None,
        }
    }

    /// Create a reconciler from comparison settings.
    pub fn from_settings(primary_keys: &[String], settings: &ComparisonSettings) -> Self {
        Reconciler::new(primary_keys, settings.join_type, settings.track_changes)
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Compare the current snapshot against the previous one.
    ///
    /// Fails fast on a missing key column or a duplicate key in either
    /// snapshot.
    pub fn compare(
        &self,
        current: &Dataset,
        previous: &Dataset,
    ) -> Result<ComparisonReport, ReconcileError> {
        if self.primary_keys.is_empty() {
            return Err(ReconcileError::NoPrimaryKey);
        }

        let current_keys = self.index(current, Snapshot::Current)?;
        let previous_keys = self.index(previous, Snapshot::Previous)?;

        let mut retained = Vec::new();
        let mut new = Vec::new();
        for key in &current_keys.ordered {
            if previous_keys.rows.contains_key(key) {
                retained.push(key.clone());
            } else {
                new.push(key.clone());
            }
        }

        let lapsed: Vec<RowKey> = previous_keys
            .ordered
            .iter()
            .filter(|key| !current_keys.rows.contains_key(*key))
            .cloned()
            .collect();

        let total_previous = previous.row_count();
        let retention_undefined = total_previous == 0;
        let retention_rate = if retention_undefined {
            warn!(
                total_current = current.row_count(),
                "Previous snapshot is empty, retention rate reported as 0"
            );
            0.0
        } else {
            retained.len() as f64 / total_previous as f64
        };

        let changes = self.track_changes.then(|| {
            self.diff(current, previous, &retained, &current_keys.rows, &previous_keys.rows)
        });

        if let Some(metrics) = &self.metrics {
            metrics.record_reconciliation();
        }

        debug!(
            join_type = %self.join_type,
            new = new.len(),
            lapsed = lapsed.len(),
            retained = retained.len(),
            retention_rate,
            "Reconciliation complete"
        );

        Ok(ComparisonReport {
            join_type: self.join_type,
            total_current: current.row_count(),
            total_previous,
            new: self.join_type.includes_new().then_some(new),
            lapsed: self.join_type.includes_lapsed().then_some(lapsed),
            retained,
            retention_rate,
            retention_undefined,
            changes,
        })
    }

    /// Map every key to its row, rejecting duplicates.
    fn index(&self, dataset: &Dataset, snapshot: Snapshot) -> Result<KeyIndex, ReconcileError> {
        if let Err(missing) = dataset.resolve_columns(&self.primary_keys) {
            return Err(ReconcileError::MissingKeyColumn {
                snapshot,
                column: missing.into_iter().next().unwrap_or_default(),
            });
        }

        let keys = dataset.row_keys(&self.primary_keys);
        let mut rows = AHashMap::with_capacity(keys.len());
        let mut ordered = Vec::with_capacity(keys.len());
        for (row, key) in keys.into_iter().enumerate() {
            if rows.insert(key.clone(), row).is_some() {
                return Err(ReconcileError::DuplicateKey { snapshot, key });
            }
            ordered.push(key);
        }

        Ok(KeyIndex { rows, ordered })
    }

    /// Changed shared non-key columns of each retained key.
    fn diff(
        &self,
        current: &Dataset,
        previous: &Dataset,
        retained: &[RowKey],
        current_rows: &AHashMap<RowKey, usize>,
        previous_rows: &AHashMap<RowKey, usize>,
    ) -> Vec<KeyChanges> {
        let shared: Vec<(&String, usize, usize)> = current
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| !self.primary_keys.contains(*name))
            .filter_map(|(c, name)| previous.column_index(name).map(|p| (name, c, p)))
            .collect();

        retained
            .iter()
            .filter_map(|key| {
                let cur = *current_rows.get(key)?;
                let prev = *previous_rows.get(key)?;

                let fields: BTreeMap<String, FieldChange> = shared
                    .iter()
                    .filter_map(|&(name, c, p)| {
                        let current_value = current.value(cur, c);
                        let previous_value = previous.value(prev, p);
                        (current_value != previous_value).then(|| {
                            (
                                name.clone(),
                                FieldChange {
                                    previous: previous_value.clone(),
                                    current: current_value.clone(),
                                },
                            )
                        })
                    })
                    .collect();

                (!fields.is_empty()).then(|| KeyChanges {
                    key: key.clone(),
                    fields,
                })
            })
            .collect()
    }
}

struct KeyIndex {
    rows: AHashMap<RowKey, usize>,
    /// Keys in row order
    ordered: Vec<RowKey>,
}

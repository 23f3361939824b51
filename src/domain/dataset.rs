use ahash::AHashMap;
use thiserror::Error;

use super::key::RowKey;
use super::value::{ColumnType, Value};

/// Errors raised while assembling a dataset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatasetError {
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Immutable in-memory snapshot of the policy book.
///
/// Rows are stored as value vectors aligned with the declared columns, so
/// every row exposes the same column set and missing cells are `Null`.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<String>,
    index: AHashMap<String, usize>,
    types: Vec<ColumnType>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Build a dataset from column names and aligned rows.
    pub fn new<C, S>(columns: C, rows: Vec<Vec<Value>>) -> Result<Self, DatasetError>
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();

        let mut index = AHashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(DatasetError::DuplicateColumn(name.clone()));
            }
        }

        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DatasetError::RowWidth {
                    row: i,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }

        let types = (0..columns.len())
            .map(|c| ColumnType::infer(rows.iter().map(|row| &row[c])))
            .collect();

        Ok(Dataset {
            columns,
            index,
            types,
            rows,
        })
    }

    /// Build a dataset from name/value records.
    ///
    /// Columns are declared in first-seen order and any column a record
    /// does not mention is filled with `Null`.
    pub fn from_records<K>(records: Vec<Vec<(K, Value)>>) -> Result<Self, DatasetError>
    where
        K: Into<String>,
    {
        let mut columns: Vec<String> = Vec::new();
        let mut index: AHashMap<String, usize> = AHashMap::new();
        let mut sparse = Vec::with_capacity(records.len());

        for record in records {
            let mut cells = Vec::with_capacity(record.len());
            for (name, value) in record {
                let name = name.into();
                let idx = match index.get(&name) {
                    Some(&idx) => idx,
                    None => {
                        let idx = columns.len();
                        index.insert(name.clone(), idx);
                        columns.push(name);
                        idx
                    }
                };
                cells.push((idx, value));
            }
            sparse.push(cells);
        }

        let rows = sparse
            .into_iter()
            .map(|cells| {
                let mut row = vec![Value::Null; columns.len()];
                for (idx, value) in cells {
                    row[idx] = value;
                }
                row
            })
            .collect();

        Dataset::new(columns, rows)
    }

    /// An empty dataset with the given columns.
    pub fn empty<C, S>(columns: C) -> Result<Self, DatasetError>
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Dataset::new(columns, Vec::new())
    }

    /// Declared columns in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column_index(name).map(|i| self.types[i])
    }

    /// Inferred types aligned with [`Dataset::columns`].
    pub fn column_types(&self) -> &[ColumnType] {
        &self.types
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Raw rows aligned with [`Dataset::columns`].
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Value at a row and column index.
    #[inline]
    pub fn value(&self, row: usize, column: usize) -> &Value {
        &self.rows[row][column]
    }

    /// Named view over a single row.
    pub fn row(&self, row: usize) -> Option<RowView<'_>> {
        self.rows.get(row).map(|values| RowView {
            dataset: self,
            values,
        })
    }

    /// Values of one column in row order.
    pub fn column_values(&self, column: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[column])
    }

    /// Resolve column names to indexes.
    ///
    /// Returns the names that are not declared when any are missing.
    pub fn resolve_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>, Vec<String>> {
        let mut resolved = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.column_index(name.as_ref()) {
                Some(idx) => resolved.push(idx),
                None => missing.push(name.as_ref().to_string()),
            }
        }
        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(missing)
        }
    }

    /// Key of every row, in row order.
    ///
    /// Falls back to row ordinals when the key columns are not all present.
    pub fn row_keys<S: AsRef<str>>(&self, primary_keys: &[S]) -> Vec<RowKey> {
        match self.resolve_columns(primary_keys) {
            Ok(key_columns) if !key_columns.is_empty() => self
                .rows
                .iter()
                .map(|row| RowKey::from_values(key_columns.iter().map(|&c| &row[c])))
                .collect(),
            _ => (0..self.rows.len()).map(RowKey::ordinal).collect(),
        }
    }
}

/// Borrowed view over one row with lookup by column name.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    dataset: &'a Dataset,
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.dataset.column_index(column).map(|i| &self.values[i])
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

//! Snapshot loading from delimited text files.

mod cells;

pub use cells::{parse_cell, parse_date_cell};

use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::domain::{AuditSettings, Dataset, DatasetError, Encoding, Value};

/// Errors that can occur while loading a snapshot.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid dataset: {0}")]
    Dataset(#[from] DatasetError),

    #[error("{}", describe_mismatch(.missing_in_current, .missing_in_previous, .reordered))]
    ColumnMismatch {
        missing_in_current: Vec<String>,
        missing_in_previous: Vec<String>,
        reordered: bool,
    },
}

/// How raw cells are typed while loading.
///
/// Columns the validator checks as dates are parsed with the validator's
/// format only. Every other column goes through [`parse_cell`] with the
/// loader's format.
#[derive(Debug, Clone)]
pub struct CellTyping {
    date_format: String,
    date_columns: Vec<String>,
    date_column_format: String,
}

impl CellTyping {
    /// Type every column with `date_format` and no declared date columns.
    pub fn new(date_format: impl Into<String>) -> Self {
        let date_format = date_format.into();
        CellTyping {
            date_column_format: date_format.clone(),
            date_format,
            date_columns: Vec::new(),
        }
    }

    /// Declare date columns and the format their cells must follow.
    pub fn with_date_columns(mut self, columns: &[String], format: impl Into<String>) -> Self {
        self.date_columns = columns.to_vec();
        self.date_column_format = format.into();
        self
    }

    pub fn from_settings(settings: &AuditSettings) -> Self {
        let mut columns: Vec<String> = settings.validator.date_columns.clone();
        for pair in &settings.validator.date_order {
            for column in [&pair.start, &pair.end] {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        CellTyping::new(settings.loader.date_format.clone())
            .with_date_columns(&columns, settings.validator.date_format.clone())
    }

    fn parse(&self, raw: &str, is_date_column: bool) -> Value {
        if is_date_column {
            parse_date_cell(raw, &self.date_column_format)
        } else {
            parse_cell(raw, &self.date_format)
        }
    }
}

/// Load a `.csv` or `.tsv` snapshot.
pub fn load_dataset(path: impl AsRef<Path>, settings: &AuditSettings) -> Result<Dataset, LoadError> {
    let path = path.as_ref();
    let delimiter = delimiter_for(path)?;

    let bytes = fs::read(path)?;
    let text = decode(bytes, settings.loader.encoding)?;
    let dataset = parse_delimited(&text, delimiter, &CellTyping::from_settings(settings))?;

    info!(
        path = %path.display(),
        rows = dataset.row_count(),
        columns = dataset.columns().len(),
        "Loaded snapshot"
    );

    Ok(dataset)
}

/// Parse delimited text with a header row.
pub fn parse_delimited(text: &str, delimiter: u8, typing: &CellTyping) -> Result<Dataset, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let date_columns: Vec<bool> = columns
        .iter()
        .map(|c| typing.date_columns.contains(c))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<Value> = record
            .iter()
            .enumerate()
            .map(|(i, cell)| typing.parse(cell, date_columns.get(i).copied().unwrap_or(false)))
            .collect();
        rows.push(row);
    }

    Ok(Dataset::new(columns, rows)?)
}

/// Check that both snapshots declare the same columns in the same order.
pub fn ensure_matching_columns(current: &Dataset, previous: &Dataset) -> Result<(), LoadError> {
    if current.columns() == previous.columns() {
        return Ok(());
    }

    let missing_in_current: Vec<String> = previous
        .columns()
        .iter()
        .filter(|c| !current.has_column(c))
        .cloned()
        .collect();
    let missing_in_previous: Vec<String> = current
        .columns()
        .iter()
        .filter(|c| !previous.has_column(c))
        .cloned()
        .collect();
    let reordered = missing_in_current.is_empty() && missing_in_previous.is_empty();

    Err(LoadError::ColumnMismatch {
        missing_in_current,
        missing_in_previous,
        reordered,
    })
}

fn delimiter_for(path: &Path) -> Result<u8, LoadError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => Ok(b','),
        "tsv" => Ok(b'\t'),
        other => Err(LoadError::UnsupportedFormat(format!(".{other}"))),
    }
}

fn decode(bytes: Vec<u8>, encoding: Encoding) -> Result<String, LoadError> {
    match encoding {
        Encoding::Utf8 => {
            let text = String::from_utf8(bytes)?;
            Ok(match text.strip_prefix('\u{feff}') {
                Some(stripped) => stripped.to_string(),
                None => text,
            })
        }
        // Latin-1 maps every byte to the code point of the same value
        Encoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
    }
}

fn describe_mismatch(
    missing_in_current: &[String],
    missing_in_previous: &[String],
    reordered: &bool,
) -> String {
    let mut parts = Vec::new();
    if !missing_in_current.is_empty() {
        parts.push(format!("Columns missing in current snapshot: {}", missing_in_current.join(", ")));
    }
    if !missing_in_previous.is_empty() {
        parts.push(format!("Columns missing in previous snapshot: {}", missing_in_previous.join(", ")));
    }
    if *reordered {
        parts.push("Columns are in a different order".to_string());
    }
    parts.join("; ")
}

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::Value;

/// Type one raw cell.
///
/// Empty cells are null. Otherwise the first of boolean, decimal and date
/// (in `date_format`) that parses wins, and anything else stays text.
pub fn parse_cell(raw: &str, date_format: &str) -> Value {
    let cell = raw.trim();
    if cell.is_empty() {
        return Value::Null;
    }

    if cell.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if cell.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    if looks_numeric(cell) {
        if let Ok(number) = Decimal::from_str(cell) {
            return Value::Number(number);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(cell, date_format) {
        return Value::Date(date);
    }

    Value::Text(cell.to_string())
}

/// Type one cell of a declared date column.
///
/// Only `date_format` is tried. A cell that does not parse keeps its text,
/// even when it would read as a number, so date checks see what the file
/// actually holds.
pub fn parse_date_cell(raw: &str, date_format: &str) -> Value {
    let cell = raw.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    match NaiveDate::parse_from_str(cell, date_format) {
        Ok(date) => Value::Date(date),
        Err(_) => Value::Text(cell.to_string()),
    }
}

/// Digits with an optional sign and decimal point.
fn looks_numeric(cell: &str) -> bool {
    let digits = cell.strip_prefix(['-', '+']).unwrap_or(cell);
    !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("  ", "%Y-%m-%d"), Value::Null);
        assert_eq!(parse_cell("TRUE", "%Y-%m-%d"), Value::Bool(true));
        assert_eq!(parse_cell("-12.5", "%Y-%m-%d"), Value::Number(Decimal::new(-125, 1)));
        assert_eq!(
            parse_cell("2024-03-01", "%Y-%m-%d"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(parse_cell("Red", "%Y-%m-%d"), Value::from("Red"));
    }

    #[test]
    fn test_not_quite_numbers_stay_text() {
        assert_eq!(parse_cell("1.2.3", "%Y-%m-%d"), Value::from("1.2.3"));
        assert_eq!(parse_cell("1_000", "%Y-%m-%d"), Value::from("1_000"));
        assert_eq!(parse_cell(".", "%Y-%m-%d"), Value::from("."));
    }

    #[test]
    fn test_date_not_in_format_stays_text() {
        assert_eq!(parse_cell("01/03/2024", "%Y-%m-%d"), Value::from("01/03/2024"));
    }

    #[test]
    fn test_date_cell_uses_only_its_format() {
        assert_eq!(
            parse_date_cell("20240131", "%Y%m%d"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
        assert_eq!(parse_date_cell("2024-01-31", "%d/%m/%Y"), Value::from("2024-01-31"));
        assert_eq!(parse_date_cell("12345", "%Y-%m-%d"), Value::from("12345"));
        assert_eq!(parse_date_cell(" ", "%Y-%m-%d"), Value::Null);
    }
}

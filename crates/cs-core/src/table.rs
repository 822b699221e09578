//! Tabular data types consumed by the reconciler

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A table of named columns loaded from a tabular source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Column definitions
    pub columns: Vec<Column>,
    /// Row data
    pub rows: Vec<Row>,
    /// Source file path
    pub source_path: PathBuf,
}

impl Table {
    /// Create a new empty table
    pub fn new(source_path: PathBuf) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            source_path,
        }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.find_column(name).map(|c| c.index)
    }

    /// Get the value of a named column in a row.
    ///
    /// Returns `None` both when the table has no such column and when the
    /// cell is missing, so callers only ever see present values.
    pub fn value<'a>(&self, row: &'a Row, column: &str) -> Option<&'a CellValue> {
        let index = self.column_index(column)?;
        row.get(index).filter(|cell| !cell.is_missing())
    }
}

/// A column definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name as given in the header
    pub name: String,
    /// Column index (0-based)
    pub index: usize,
}

impl Column {
    /// Create a new column
    pub fn new(name: String, index: usize) -> Self {
        Self { name, index }
    }
}

/// A row of data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    /// 1-based data row number (header excluded)
    pub number: usize,
    /// Cell values for each column
    pub cells: Vec<CellValue>,
}

impl Row {
    /// Create a new row
    pub fn new(number: usize, cells: Vec<CellValue>) -> Self {
        Self { number, cells }
    }

    /// Get a cell value by column index
    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.cells.get(index)
    }
}

/// A cell value with type detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// No value in the source
    Missing,
}

impl CellValue {
    /// Parse a string into a CellValue, detecting the type.
    ///
    /// Numbers are only detected when their canonical rendering matches the
    /// text exactly, so identifiers such as `007` or `1.50` stay strings.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return CellValue::Missing;
        }

        if let Ok(i) = trimmed.parse::<i64>() {
            if i.to_string() == trimmed {
                return CellValue::Integer(i);
            }
        }

        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() && f.to_string() == trimmed {
                return CellValue::Float(f);
            }
        }

        CellValue::String(trimmed.to_string())
    }

    /// Check if the cell holds no value
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    /// Borrow the text of a string cell
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a display string
    pub fn to_string_value(&self) -> String {
        match self {
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::String(s) => s.clone(),
            CellValue::Missing => String::new(),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(fl) => write!(f, "{}", fl),
            CellValue::String(s) => write!(f, "{}", s),
            CellValue::Missing => write!(f, ""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_parse_integer() {
        assert_eq!(CellValue::parse("42"), CellValue::Integer(42));
        assert_eq!(CellValue::parse("-123"), CellValue::Integer(-123));
        assert_eq!(CellValue::parse("0"), CellValue::Integer(0));
    }

    #[test]
    fn test_cell_value_parse_float() {
        assert_eq!(CellValue::parse("3.25"), CellValue::Float(3.25));
        assert_eq!(CellValue::parse("-2.5"), CellValue::Float(-2.5));
    }

    #[test]
    fn test_cell_value_keeps_identifier_text() {
        assert_eq!(CellValue::parse("007"), CellValue::String("007".to_string()));
        assert_eq!(CellValue::parse("1.50"), CellValue::String("1.50".to_string()));
        assert_eq!(CellValue::parse("+5"), CellValue::String("+5".to_string()));
        assert_eq!(CellValue::parse("NaN"), CellValue::String("NaN".to_string()));
    }

    #[test]
    fn test_cell_value_parse_missing() {
        assert_eq!(CellValue::parse(""), CellValue::Missing);
        assert_eq!(CellValue::parse("   "), CellValue::Missing);
    }

    #[test]
    fn test_zero_is_present() {
        assert!(CellValue::Missing.is_missing());
        assert!(!CellValue::Integer(0).is_missing());
        assert!(!CellValue::String(String::new()).is_missing());
    }

    #[test]
    fn test_table_value_lookup() {
        let mut table = Table::new(PathBuf::from("t.csv"));
        table.columns = vec![
            Column::new("code".to_string(), 0),
            Column::new("note".to_string(), 1),
        ];
        let row = Row::new(1, vec![CellValue::String("A".to_string()), CellValue::Missing]);

        assert_eq!(
            table.value(&row, "code"),
            Some(&CellValue::String("A".to_string()))
        );
        assert_eq!(table.value(&row, "note"), None);
        assert_eq!(table.value(&row, "absent"), None);
    }
}

//! CSV/TSV loader for authoritative code tables

use crate::error::{Error, Result};
use crate::table::{CellValue, Column, Row, Table};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Tabular formats recognised by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
}

impl TabularFormat {
    /// Pick a format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(TabularFormat::Csv),
            "tsv" => Ok(TabularFormat::Tsv),
            _ => Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                extension: if extension.is_empty() {
                    "<none>".to_string()
                } else {
                    format!(".{}", extension)
                },
            }),
        }
    }

    /// Field delimiter byte
    pub fn delimiter(self) -> u8 {
        match self {
            TabularFormat::Csv => b',',
            TabularFormat::Tsv => b'\t',
        }
    }
}

/// Load a table from a `.csv` or `.tsv` file.
///
/// The extension is checked before the file is opened.
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let format = TabularFormat::from_path(path)?;

    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let table = read_delimited(BufReader::new(file), format.delimiter(), path.to_path_buf())?;
    tracing::debug!(
        "Loaded {} rows x {} columns from {}",
        table.row_count(),
        table.column_count(),
        path.display()
    );
    Ok(table)
}

/// Parse delimited text from a string (useful for testing)
pub fn parse_delimited_str(content: &str, delimiter: u8, source_name: &str) -> Result<Table> {
    read_delimited(content.as_bytes(), delimiter, PathBuf::from(source_name))
}

fn read_delimited<R: Read>(reader: R, delimiter: u8, path: PathBuf) -> Result<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true) // Allow varying number of fields
        .from_reader(reader);

    let headers = csv_reader.headers().map_err(|e| Error::Csv {
        path: path.clone(),
        source: e,
    })?;

    // Spreadsheet exports often start with a UTF-8 BOM
    let columns: Vec<Column> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| Column::new(name.trim_start_matches('\u{feff}').trim().to_string(), i))
        .collect();

    if columns.is_empty() {
        return Err(Error::TableParse {
            path,
            message: "no columns found in header".to_string(),
        });
    }

    let mut rows = Vec::new();
    for (row_idx, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| Error::Csv {
            path: path.clone(),
            source: e,
        })?;

        let mut cells: Vec<CellValue> = record.iter().map(CellValue::parse).collect();

        // Pad with missing cells if row is shorter than header
        while cells.len() < columns.len() {
            cells.push(CellValue::Missing);
        }

        if cells.len() > columns.len() {
            tracing::warn!(
                "row {} in {} has more cells than columns, truncating",
                row_idx + 1,
                path.display()
            );
            cells.truncate(columns.len());
        }

        rows.push(Row::new(row_idx + 1, cells));
    }

    Ok(Table {
        columns,
        rows,
        source_path: path,
    })
}

//! Reconcile a CodeSystem against authoritative table rows
//!
//! Codes found in the table are added or refreshed; codes that vanished from
//! the table are kept and flagged `inactive` instead of being deleted.

use crate::config::MergeConfig;
use crate::error::{Error, Result};
use crate::model::{Code, CodeStatus, CodeSystem, Designation};
use crate::table::{CellValue, Row, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a reconciliation changed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Codes that were not in the CodeSystem before
    pub added: Vec<String>,
    /// Existing codes refreshed from the table
    pub updated: Vec<String>,
    /// Existing codes absent from the table, now flagged inactive
    pub deactivated: Vec<String>,
    /// Row numbers skipped because their code cell was empty
    pub skipped_rows: Vec<usize>,
}

impl MergeReport {
    /// Total number of codes touched
    pub fn changed_count(&self) -> usize {
        self.added.len() + self.updated.len() + self.deactivated.len()
    }
}

/// Merge table rows into a CodeSystem in place.
///
/// Properties and designations of a code found in the table are replaced
/// wholesale by the row's values. Missing columns and empty cells count as
/// "no value". The only hard failure is a table without the code column,
/// which is checked before anything is modified.
pub fn reconcile(
    code_system: &mut CodeSystem,
    table: &Table,
    config: &MergeConfig,
) -> Result<MergeReport> {
    if table.column_index(&config.code_column).is_none() {
        return Err(Error::MissingColumn {
            column: config.code_column.clone(),
            path: table.source_path.clone(),
        });
    }
    warn_unknown_columns(table, config);

    let existing: BTreeSet<String> = code_system.codes.keys().cloned().collect();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut report = MergeReport::default();

    for row in &table.rows {
        let Some(code) = table.value(row, &config.code_column).map(CellValue::to_string_value) else {
            tracing::warn!(
                "row {} in {}: no value in code column '{}', skipped",
                row.number,
                table.source_path.display(),
                config.code_column
            );
            report.skipped_rows.push(row.number);
            continue;
        };

        let first_sighting = seen.insert(code.clone());
        if existing.contains(&code) {
            if first_sighting {
                report.updated.push(code.clone());
            }
        } else if first_sighting {
            report.added.push(code.clone());
        }

        let known = code_system.codes.contains_key(&code);
        let entry = code_system
            .codes
            .entry(code.clone())
            .or_insert_with(|| new_code(&code, table, row, config));
        if known {
            refresh_code(entry, table, row, config);
        }

        fill_properties(entry, table, row, config);
        fill_designations(entry, table, row, config);
    }

    for code in existing.difference(&seen) {
        if let Some(entry) = code_system.codes.get_mut(code) {
            entry.deactivate();
            report.deactivated.push(code.clone());
        }
    }

    tracing::info!(
        "Reconciled {} rows: {} added, {} updated, {} deactivated, {} skipped",
        table.row_count(),
        report.added.len(),
        report.updated.len(),
        report.deactivated.len(),
        report.skipped_rows.len()
    );

    Ok(report)
}

fn new_code(code: &str, table: &Table, row: &Row, config: &MergeConfig) -> Code {
    let display = match table.value(row, &config.display_column) {
        Some(cell) => cell.to_string_value(),
        None => {
            tracing::warn!(
                "row {}: new code '{}' has no display in column '{}'",
                row.number,
                code,
                config.display_column
            );
            String::new()
        }
    };

    let mut entry = Code::new(code, display);
    // Only textual cells make a definition for a new code
    entry.definition = config
        .definition_column
        .as_deref()
        .and_then(|column| table.value(row, column))
        .and_then(CellValue::as_text)
        .map(str::to_string);
    entry
}

fn refresh_code(entry: &mut Code, table: &Table, row: &Row, config: &MergeConfig) {
    if let Some(display) = table.value(row, &config.display_column) {
        entry.display = display.to_string_value();
    }

    if let Some(column) = config.definition_column.as_deref() {
        if table.column_index(column).is_some() {
            entry.definition = table.value(row, column).map(CellValue::to_string_value);
        }
    }

    entry.status = CodeStatus::Active;
    entry.properties.clear();
    entry.designations.clear();
}

fn fill_properties(entry: &mut Code, table: &Table, row: &Row, config: &MergeConfig) {
    for (property, column) in &config.property_mappings {
        if let Some(cell) = table.value(row, column) {
            entry
                .properties
                .insert(property.clone(), cell.to_string_value());
        }
    }
}

fn fill_designations(entry: &mut Code, table: &Table, row: &Row, config: &MergeConfig) {
    for display in &config.additional_displays {
        let Some(cell) = table.value(row, &display.column) else {
            continue;
        };
        let text = cell.to_string_value();
        for term in display.terms(&text) {
            entry.designations.push(Designation {
                value: term.to_string(),
                language: display.language.clone(),
                use_: display.use_.clone(),
            });
        }
    }
}

fn warn_unknown_columns(table: &Table, config: &MergeConfig) {
    let configured = std::iter::once(&config.display_column)
        .chain(config.definition_column.iter())
        .chain(config.property_mappings.values())
        .chain(config.additional_displays.iter().map(|d| &d.column));

    for column in configured {
        if table.find_column(column).is_none() {
            tracing::warn!(
                "column '{}' not found in {}, treated as empty",
                column,
                table.source_path.display()
            );
        }
    }
}

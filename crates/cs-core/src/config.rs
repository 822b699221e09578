//! Merge configuration: how table columns map onto the CodeSystem

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Column-to-field mapping used by the reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConfig {
    /// Column holding the code value
    #[serde(default = "default_code_column")]
    pub code_column: String,
    /// Column holding the display label
    #[serde(default = "default_display_column")]
    pub display_column: String,
    /// Column holding the long-form definition
    #[serde(default)]
    pub definition_column: Option<String>,
    /// Property name -> column name
    #[serde(default)]
    pub property_mappings: IndexMap<String, String>,
    /// Columns turned into designations, in order
    #[serde(default)]
    pub additional_displays: Vec<AdditionalDisplay>,
}

fn default_code_column() -> String {
    "code".to_string()
}

fn default_display_column() -> String {
    "display".to_string()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            code_column: default_code_column(),
            display_column: default_display_column(),
            definition_column: None,
            property_mappings: IndexMap::new(),
            additional_displays: Vec::new(),
        }
    }
}

impl MergeConfig {
    /// Load a merge configuration from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| Error::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Map a property to a column
    pub fn map_property(mut self, property: impl Into<String>, column: impl Into<String>) -> Self {
        self.property_mappings.insert(property.into(), column.into());
        self
    }

    /// Add a designation source column
    pub fn add_display(mut self, display: AdditionalDisplay) -> Self {
        self.additional_displays.push(display);
        self
    }
}

/// A column that yields designations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalDisplay {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    /// Splits one cell into several designations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
}

impl AdditionalDisplay {
    /// Designations from a column, one per cell
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ..Self::default()
        }
    }

    /// Tag designations with a language code
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Tag designations with a usage coding
    pub fn use_code(mut self, use_: impl Into<String>) -> Self {
        self.use_ = Some(use_.into());
        self
    }

    /// Split cells on `separator`
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    /// Split a cell into designation terms.
    ///
    /// Terms are trimmed and empty terms dropped.
    pub fn terms<'a>(&self, cell: &'a str) -> Vec<&'a str> {
        let parts: Vec<&str> = match self.separator.as_deref() {
            Some(sep) if !sep.is_empty() => cell.split(sep).collect(),
            _ => vec![cell],
        };
        parts
            .into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

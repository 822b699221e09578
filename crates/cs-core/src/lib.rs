//! cs-core: Core library for keeping FSH CodeSystems in sync with tabular data
//!
//! This library provides functionality to:
//! - Parse FSH CodeSystem documents, including indexed `^property`/`^designation` groups
//! - Load CSV and TSV tables
//! - Reconcile a CodeSystem against table rows using a column mapping
//! - Write the CodeSystem back as canonical FSH

pub mod config;
pub mod error;
pub mod indexed;
pub mod model;
pub mod parser;
pub mod reconciler;
pub mod serializer;
pub mod table;
pub mod tabular;

pub use config::{AdditionalDisplay, MergeConfig};
pub use error::{Error, Result};
pub use indexed::{Cursors, Group, IndexToken, Owner};
pub use model::{Code, CodeStatus, CodeSystem, Designation, PropertyDefinition, PropertyType};
pub use parser::{parse_code_system, parse_file, ParseOptions, ParseWarning, ParsedCodeSystem, WarningKind};
pub use reconciler::{reconcile, MergeReport};
pub use serializer::{to_fsh, write_fsh};
pub use table::{CellValue, Column, Row, Table};
pub use tabular::{load_table, parse_delimited_str, TabularFormat};

//! In-memory CodeSystem model
//!
//! Pure data. The parser and the reconciler build and mutate it; the
//! serializer only reads it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Property name used to flag codes that vanished from the authoritative table
pub const INACTIVE_PROPERTY: &str = "inactive";

/// A FHIR CodeSystem as written in FSH
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSystem {
    /// Canonical name from the `CodeSystem:` header
    pub name: String,
    pub id: String,
    pub title: String,
    pub description: String,
    /// Content completeness mode (`complete`, `fragment`, ...)
    pub content_mode: String,
    /// Publication status
    pub status: String,
    pub url: String,
    pub version: String,
    /// Extra scalar metadata fields, in document order
    pub extra: IndexMap<String, String>,
    /// Property definitions keyed by property code, in document order
    pub properties: IndexMap<String, PropertyDefinition>,
    /// Codes keyed by code value; iteration order is the canonical sort order
    pub codes: BTreeMap<String, Code>,
}

impl CodeSystem {
    /// Create an empty code system with the given canonical name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Get the number of codes
    pub fn code_count(&self) -> usize {
        self.codes.len()
    }

    /// Find a code by value
    pub fn find_code(&self, code: &str) -> Option<&Code> {
        self.codes.get(code)
    }

    /// Declared type of a property, defaulting to `string` when undefined
    pub fn property_type(&self, name: &str) -> PropertyType {
        self.properties
            .get(name)
            .map(|p| p.value_type.clone())
            .unwrap_or(PropertyType::String)
    }

    /// Property names used by codes that have no definition
    pub fn undefined_properties(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .codes
            .values()
            .flat_map(|c| c.properties.keys())
            .filter(|name| !self.properties.contains_key(name.as_str()))
            .map(|name| name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// A property definition from the `^property` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    /// Property code; also the key in `CodeSystem::properties`
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub value_type: PropertyType,
}

impl PropertyDefinition {
    /// Create a definition with no description or uri
    pub fn new(code: impl Into<String>, value_type: PropertyType) -> Self {
        Self {
            code: code.into(),
            uri: None,
            description: None,
            value_type,
        }
    }
}

/// Declared value type of a property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum PropertyType {
    Code,
    Coding,
    String,
    Uri,
    /// Any other FHIR type (`boolean`, `integer`, `dateTime`, ...), passed through
    Other(String),
}

impl PropertyType {
    /// Type name as written in FSH
    pub fn as_str(&self) -> &str {
        match self {
            PropertyType::Code => "code",
            PropertyType::Coding => "Coding",
            PropertyType::String => "string",
            PropertyType::Uri => "uri",
            PropertyType::Other(name) => name,
        }
    }

    /// Suffix used in `value[x]` field names, e.g. `Code` for `valueCode`
    pub fn value_suffix(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "code" => PropertyType::Code,
            "Coding" => PropertyType::Coding,
            "string" => PropertyType::String,
            "uri" => PropertyType::Uri,
            other => PropertyType::Other(other.to_string()),
        }
    }
}

impl FromStr for PropertyType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl From<String> for PropertyType {
    fn from(s: String) -> Self {
        Self::from_name(&s)
    }
}

impl From<PropertyType> for String {
    fn from(t: PropertyType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    #[default]
    Active,
    /// Flagged with `inactive = "true"`
    Inactive,
}

/// One concept in the code system
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Code {
    pub code: String,
    pub display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default)]
    pub status: CodeStatus,
    /// One value per property name; a later assignment overwrites
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Alternate labels; order is significant
    #[serde(default)]
    pub designations: Vec<Designation>,
}

impl Code {
    /// Create an active code with no properties or designations
    pub fn new(code: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display: display.into(),
            ..Self::default()
        }
    }

    /// Check whether the code is active
    pub fn is_active(&self) -> bool {
        self.status == CodeStatus::Active
    }

    /// Flag the code as retired while keeping everything else
    pub fn deactivate(&mut self) {
        self.properties
            .insert(INACTIVE_PROPERTY.to_string(), "true".to_string());
        self.status = CodeStatus::Inactive;
    }

    /// Derive the status from the `inactive` property
    pub(crate) fn sync_status(&mut self) {
        self.status = match self.properties.get(INACTIVE_PROPERTY).map(String::as_str) {
            Some("true") => CodeStatus::Inactive,
            _ => CodeStatus::Active,
        };
    }
}

/// An alternate or localised label for a code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Designation {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Coded usage classifier, e.g. `http://snomed.info/sct#900000000000013009`
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
}

impl Designation {
    /// Create a designation with only a value
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_round_trip() {
        for name in ["code", "Coding", "string", "uri", "boolean", "dateTime"] {
            let t: PropertyType = name.parse().unwrap();
            assert_eq!(t.as_str(), name);
        }
        assert_eq!("Coding".parse::<PropertyType>().unwrap(), PropertyType::Coding);
        assert_eq!(
            "boolean".parse::<PropertyType>().unwrap(),
            PropertyType::Other("boolean".to_string())
        );
    }

    #[test]
    fn test_value_suffix() {
        assert_eq!(PropertyType::Code.value_suffix(), "Code");
        assert_eq!(PropertyType::Coding.value_suffix(), "Coding");
        assert_eq!(PropertyType::String.value_suffix(), "String");
        assert_eq!(PropertyType::Other("dateTime".to_string()).value_suffix(), "DateTime");
    }

    #[test]
    fn test_property_type_defaults_to_string() {
        let mut cs = CodeSystem::new("Test");
        cs.properties.insert(
            "parent".to_string(),
            PropertyDefinition::new("parent", PropertyType::Code),
        );

        assert_eq!(cs.property_type("parent"), PropertyType::Code);
        assert_eq!(cs.property_type("notes"), PropertyType::String);
    }

    #[test]
    fn test_deactivate_keeps_existing_properties() {
        let mut code = Code::new("A", "Alpha");
        code.properties.insert("status".to_string(), "draft".to_string());

        code.deactivate();

        assert!(!code.is_active());
        assert_eq!(code.properties.get("status").map(String::as_str), Some("draft"));
        assert_eq!(code.properties.get(INACTIVE_PROPERTY).map(String::as_str), Some("true"));
    }

    #[test]
    fn test_undefined_properties() {
        let mut cs = CodeSystem::new("Test");
        cs.properties.insert(
            "status".to_string(),
            PropertyDefinition::new("status", PropertyType::Code),
        );
        let mut a = Code::new("A", "Alpha");
        a.properties.insert("status".to_string(), "x".to_string());
        a.properties.insert("inactive".to_string(), "true".to_string());
        let mut b = Code::new("B", "Beta");
        b.properties.insert("inactive".to_string(), "true".to_string());
        cs.codes.insert("A".to_string(), a);
        cs.codes.insert("B".to_string(), b);

        assert_eq!(cs.undefined_properties(), vec!["inactive"]);
    }

    #[test]
    fn test_model_json_shape() {
        let mut code = Code::new("A", "Alpha");
        code.designations.push(Designation {
            value: "Alfa".to_string(),
            language: Some("es".to_string()),
            use_: None,
        });

        let json = serde_json::to_value(&code).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["designations"][0]["language"], "es");
        assert!(json.get("definition").is_none());

        let def = PropertyDefinition::new("parent", PropertyType::Code);
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["type"], "code");
    }
}

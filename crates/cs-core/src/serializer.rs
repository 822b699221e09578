//! FSH writer for CodeSystems
//!
//! Output is canonical: header fields in a fixed order, codes sorted by
//! value, properties of a code sorted by name, designations in model order.

use crate::error::{Error, Result};
use crate::indexed::{encode_group, format_code, format_value, quote, Group};
use crate::model::{Code, CodeSystem, PropertyDefinition, PropertyType};
use std::fs;
use std::path::Path;

/// Render a CodeSystem as an FSH document
pub fn to_fsh(code_system: &CodeSystem) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("CodeSystem: {}", code_system.name));
    lines.push(format!("Id: {}", code_system.id));
    lines.push(format!("Title: {}", quote(&code_system.title)));
    lines.push(format!("Description: {}", quote(&code_system.description)));
    lines.push(format!("* ^content: {}", code_system.content_mode));
    lines.push(format!("* ^status: {}", code_system.status));
    lines.push(format!("* ^url: {}", quote(&code_system.url)));
    lines.push(format!("* ^version: {}", quote(&code_system.version)));
    for (field, value) in &code_system.extra {
        if !value.is_empty() {
            lines.push(format!("* ^{}: {}", field, quote(value)));
        }
    }

    let definitions: Vec<&PropertyDefinition> = code_system.properties.values().collect();
    lines.extend(encode_group("* ", Group::Property, &definitions, |def| {
        definition_fields(def)
    }));

    lines.push(String::new());

    for code in code_system.codes.values() {
        write_code(&mut lines, code_system, code);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Render a CodeSystem and write it to `path`
pub fn write_fsh<P: AsRef<Path>>(code_system: &CodeSystem, path: P) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, to_fsh(code_system)).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(
        "Wrote {} codes to {}",
        code_system.code_count(),
        path.display()
    );
    Ok(())
}

fn definition_fields(def: &PropertyDefinition) -> Vec<(String, String)> {
    let mut fields = vec![("code".to_string(), format_value(&def.code, &PropertyType::Code))];
    if let Some(uri) = &def.uri {
        fields.push(("uri".to_string(), quote(uri)));
    }
    if let Some(description) = &def.description {
        fields.push(("description".to_string(), quote(description)));
    }
    fields.push((
        "type".to_string(),
        format_value(def.value_type.as_str(), &PropertyType::Code),
    ));
    fields
}

fn write_code(lines: &mut Vec<String>, code_system: &CodeSystem, code: &Code) {
    let token = format_code(&code.code);
    let mut header = format!("* {} {}", token, quote(&code.display));
    if let Some(definition) = &code.definition {
        header.push(' ');
        header.push_str(&quote(definition));
    }
    lines.push(header);

    let prefix = format!("* {} ", token);

    // BTreeMap iteration is already sorted by property name
    let properties: Vec<(&String, &String)> = code.properties.iter().collect();
    lines.extend(encode_group(&prefix, Group::Property, &properties, |(name, value)| {
        let value_type = code_system.property_type(name);
        vec![
            ("code".to_string(), format_value(name, &PropertyType::Code)),
            (
                format!("value{}", value_type.value_suffix()),
                format_value(value, &value_type),
            ),
        ]
    }));

    lines.extend(encode_group(&prefix, Group::Designation, &code.designations, |d| {
        let mut fields = vec![("value".to_string(), quote(&d.value))];
        if let Some(language) = &d.language {
            fields.push(("language".to_string(), quote(language)));
        }
        if let Some(use_) = &d.use_ {
            fields.push(("use".to_string(), format_value(use_, &PropertyType::Coding)));
        }
        fields
    }));
}

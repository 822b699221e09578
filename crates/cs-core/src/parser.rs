//! FSH parser for CodeSystem documents
//!
//! Lines are classified one at a time and fed through a small state machine
//! (header, property definitions, codes). Problems that only affect a single
//! line are reported as [`ParseWarning`]s and the line is skipped; a rule
//! that references a code which was never introduced aborts the parse.

use crate::error::{Error, Result};
use crate::indexed::{
    decode_value, parse_group_rule, slot_mut, unquote, Cursors, Group, GroupRule,
    GroupRuleError, Owner, CODE_MARKER,
};
use crate::model::{Code, CodeSystem, PropertyDefinition, PropertyType};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// FSH keywords that start a new entity
const ENTITY_KEYWORDS: &[&str] = &[
    "Alias",
    "CodeSystem",
    "Extension",
    "Instance",
    "Invariant",
    "Logical",
    "Mapping",
    "Profile",
    "Resource",
    "RuleSet",
    "ValueSet",
];

/// Options controlling which metadata fields are kept
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Scalar metadata fields kept besides the fixed ones
    pub extra_fields: Vec<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            extra_fields: vec!["valueSet".to_string()],
        }
    }
}

impl ParseOptions {
    /// Keep an additional scalar metadata field
    pub fn with_extra_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.extra_fields.iter().any(|f| f.eq_ignore_ascii_case(&field)) {
            self.extra_fields.push(field);
        }
        self
    }
}

/// Result of parsing a document
#[derive(Debug, Clone)]
pub struct ParsedCodeSystem {
    pub code_system: CodeSystem,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedCodeSystem {
    /// Check that writing the CodeSystem back over `path` loses nothing.
    ///
    /// Parsing stops at the first entity after the CodeSystem, so a file
    /// holding more than one entity cannot be rewritten in place.
    pub fn ensure_rewritable(&self, path: &Path) -> Result<()> {
        let trailing = self.warnings.iter().find_map(|w| match &w.kind {
            WarningKind::TrailingEntity(keyword) => Some((keyword, w.line.unwrap_or(0))),
            _ => None,
        });
        match trailing {
            Some((keyword, line)) => Err(Error::TrailingContent {
                path: path.to_path_buf(),
                keyword: keyword.clone(),
                line,
            }),
            None => Ok(()),
        }
    }
}

/// A recoverable problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number, `None` for document-level problems
    pub line: Option<usize>,
    pub kind: WarningKind,
}

/// Kinds of recoverable parse problems
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// No `CodeSystem:` declaration
    MissingHeader,
    /// A code was introduced without a quoted display
    CodeWithoutDisplay(String),
    /// A code was introduced twice
    DuplicateCode(String),
    /// Index token is neither a number, `=` nor `+`
    InvalidIndex(String),
    /// Group element other than `property` or `designation`
    UnknownGroup(String),
    /// Field not understood for the group
    UnknownField { group: Group, field: String },
    /// Property definition entry without a `code` field
    DefinitionWithoutCode(usize),
    /// Scalar metadata that is not retained on output
    IgnoredMetadata(String),
    /// Content after the CodeSystem that belongs to another entity
    TrailingEntity(String),
    /// Anything else
    UnrecognizedLine(String),
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.line {
            write!(f, "line {}: ", line)?;
        }
        match &self.kind {
            WarningKind::MissingHeader => write!(f, "no 'CodeSystem:' declaration found"),
            WarningKind::CodeWithoutDisplay(code) => {
                write!(f, "code '{}' has no quoted display, skipped", code)
            }
            WarningKind::DuplicateCode(code) => {
                write!(f, "code '{}' introduced more than once", code)
            }
            WarningKind::InvalidIndex(token) => write!(f, "invalid index '{}'", token),
            WarningKind::UnknownGroup(name) => write!(f, "unsupported element '^{}'", name),
            WarningKind::UnknownField { group, field } => {
                write!(f, "unsupported {} field '{}'", group.as_str(), field)
            }
            WarningKind::DefinitionWithoutCode(index) => {
                write!(f, "property definition [{}] has no code, skipped", index)
            }
            WarningKind::IgnoredMetadata(key) => {
                write!(f, "metadata field '{}' is not retained", key)
            }
            WarningKind::TrailingEntity(keyword) => {
                write!(f, "'{}' declaration ends the CodeSystem, rest ignored", keyword)
            }
            WarningKind::UnrecognizedLine(text) => write!(f, "unrecognized line '{}'", text),
        }
    }
}

/// Read and parse an FSH file
pub fn parse_file<P: AsRef<Path>>(path: P, options: &ParseOptions) -> Result<ParsedCodeSystem> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!("Parsing {}", path.display());
    parse_code_system(&content, options)
}

/// Parse an FSH document into a CodeSystem
pub fn parse_code_system(content: &str, options: &ParseOptions) -> Result<ParsedCodeSystem> {
    let mut parser = DocumentParser::new(options);
    for (idx, line) in content.lines().enumerate() {
        parser.feed(idx + 1, line)?;
        if parser.state == State::Trailing {
            break;
        }
    }
    Ok(parser.finish())
}

/// One classified source line
#[derive(Debug, PartialEq)]
enum Line<'a> {
    Blank,
    Comment,
    /// `Keyword: rest` for an FSH entity keyword
    Entity { keyword: &'a str, name: &'a str },
    /// Scalar metadata; `bare` is true for the unindented `Key: value` form
    Metadata { key: &'a str, value: String, bare: bool },
    /// `* ^property[i].field = value`
    Definition(GroupRule<'a>),
    /// `* #code "display" "definition"`; the code may itself be quoted
    CodeIntro {
        code: Cow<'a, str>,
        display: String,
        definition: Option<String>,
    },
    /// `* #code` with no quoted display
    BareCode(Cow<'a, str>),
    /// `* #code ^group[i].field = value`
    CodeRule { code: Cow<'a, str>, rule: GroupRule<'a> },
    /// A caret rule whose group part could not be read
    BadRule(GroupRuleError),
    Other,
}

fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if line.starts_with("//") {
        return Line::Comment;
    }

    let Some(rule) = line.strip_prefix('*') else {
        return classify_keyword(line);
    };
    let rule = rule.trim_start();

    if let Some(after) = rule.strip_prefix(CODE_MARKER) {
        return classify_code_line(after);
    }

    if rule.starts_with('^') {
        return match parse_group_rule(rule) {
            Ok(group_rule) => Line::Definition(group_rule),
            Err(GroupRuleError::NotAGroupRule) => {
                classify_metadata(&rule[1..], false).unwrap_or(Line::Other)
            }
            Err(e) => Line::BadRule(e),
        };
    }

    classify_metadata(rule, false).unwrap_or(Line::Other)
}

fn classify_keyword(line: &str) -> Line<'_> {
    if let Some((keyword, rest)) = line.split_once(':') {
        let keyword = keyword.trim();
        if ENTITY_KEYWORDS.contains(&keyword) {
            return Line::Entity {
                keyword,
                name: rest.trim(),
            };
        }
    }
    classify_metadata(line, true).unwrap_or(Line::Other)
}

/// `key: value`, or `key = value` for caret rules
fn classify_metadata(text: &str, bare: bool) -> Option<Line<'_>> {
    let colon = text.split_once(':').filter(|(key, _)| is_field_name(key));
    let (key, value) = match colon {
        Some(kv) => kv,
        None if !bare => text.split_once('=').filter(|(key, _)| is_field_name(key.trim()))?,
        None => return None,
    };
    Some(Line::Metadata {
        key: key.trim(),
        value: decode_value(value),
        bare,
    })
}

fn is_field_name(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric())
}

fn classify_code_line(after_marker: &str) -> Line<'_> {
    let (code, rest): (Cow<'_, str>, &str) = if after_marker.starts_with('"') {
        match take_quoted(after_marker) {
            Some((code, rest)) => (Cow::Owned(code), rest.trim()),
            None => return Line::Other,
        }
    } else {
        match after_marker.find(char::is_whitespace) {
            Some(pos) => (Cow::Borrowed(&after_marker[..pos]), after_marker[pos..].trim()),
            None => (Cow::Borrowed(after_marker), ""),
        }
    };
    if code.is_empty() {
        return Line::Other;
    }

    if rest.starts_with('^') {
        return match parse_group_rule(rest) {
            Ok(rule) => Line::CodeRule { code, rule },
            Err(GroupRuleError::NotAGroupRule) => Line::Other,
            Err(e) => Line::BadRule(e),
        };
    }

    if rest.is_empty() {
        return Line::BareCode(code);
    }

    let Some((display, rest)) = take_quoted(rest) else {
        return Line::BareCode(code);
    };
    let definition = take_quoted(rest.trim_start()).map(|(text, _)| text);

    Line::CodeIntro {
        code,
        display,
        definition,
    }
}

/// Split a leading quoted string off `text`
fn take_quoted(text: &str) -> Option<(String, &str)> {
    if !text.starts_with('"') {
        return None;
    }
    let mut escaped = false;
    for (pos, c) in text.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some((unquote(&text[..=pos]), &text[pos + 1..])),
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before any rule that belongs to a group
    Header,
    /// Inside the `^property` definitions block
    PropertyDefinitions,
    /// After the first code introduction
    Codes,
    /// Another entity started; nothing more belongs to this CodeSystem
    Trailing,
}

#[derive(Debug, Default)]
struct PendingDefinition {
    code: Option<String>,
    uri: Option<String>,
    description: Option<String>,
    value_type: Option<String>,
}

#[derive(Debug, Default)]
struct PendingProperty {
    code: Option<String>,
    value: Option<String>,
}

struct DocumentParser<'o> {
    options: &'o ParseOptions,
    state: State,
    code_system: CodeSystem,
    declared: bool,
    /// Normalised field name -> (value, seen in bare form)
    metadata: IndexMap<String, (String, bool)>,
    cursors: Cursors,
    definitions: Vec<PendingDefinition>,
    pending_properties: HashMap<String, Vec<PendingProperty>>,
    warnings: Vec<ParseWarning>,
}

impl<'o> DocumentParser<'o> {
    fn new(options: &'o ParseOptions) -> Self {
        Self {
            options,
            state: State::Header,
            code_system: CodeSystem::default(),
            declared: false,
            metadata: IndexMap::new(),
            cursors: Cursors::new(),
            definitions: Vec::new(),
            pending_properties: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, line: usize, kind: WarningKind) {
        let warning = ParseWarning {
            line: Some(line),
            kind,
        };
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    fn feed(&mut self, number: usize, raw: &str) -> Result<()> {
        match classify(raw) {
            Line::Blank | Line::Comment => {}
            Line::Entity { keyword, name } => self.on_entity(number, keyword, name),
            Line::Metadata { key, value, bare } => self.on_metadata(number, key, value, bare),
            Line::Definition(rule) => {
                if self.state == State::Header {
                    self.state = State::PropertyDefinitions;
                }
                self.on_definition(number, rule);
            }
            Line::CodeIntro {
                code,
                display,
                definition,
            } => {
                self.state = State::Codes;
                self.on_code(number, &code, display, definition);
            }
            Line::BareCode(code) => {
                self.state = State::Codes;
                self.warn(number, WarningKind::CodeWithoutDisplay(code.to_string()));
            }
            Line::CodeRule { code, rule } => self.on_code_rule(number, &code, rule)?,
            Line::BadRule(GroupRuleError::InvalidIndex(token)) => {
                self.warn(number, WarningKind::InvalidIndex(token))
            }
            Line::BadRule(GroupRuleError::UnknownGroup(name)) => {
                self.warn(number, WarningKind::UnknownGroup(name))
            }
            Line::BadRule(GroupRuleError::NotAGroupRule) | Line::Other => {
                self.warn(number, WarningKind::UnrecognizedLine(raw.trim().to_string()))
            }
        }
        Ok(())
    }

    fn on_entity(&mut self, number: usize, keyword: &str, name: &str) {
        if self.declared {
            self.warn(number, WarningKind::TrailingEntity(keyword.to_string()));
            self.state = State::Trailing;
        } else if keyword == "CodeSystem" {
            self.code_system.name = name.split_whitespace().next().unwrap_or("").to_string();
            self.declared = true;
        } else {
            tracing::debug!("line {}: skipping {} before CodeSystem", number, keyword);
        }
    }

    fn on_metadata(&mut self, number: usize, key: &str, value: String, bare: bool) {
        let Some(field) = self.metadata_field(key) else {
            self.warn(number, WarningKind::IgnoredMetadata(key.to_string()));
            return;
        };
        // Bare `Key: value` wins over `* Key: value`; otherwise the first one wins
        let keep_existing = match self.metadata.get(&field) {
            Some((_, existing_bare)) => *existing_bare || !bare,
            None => false,
        };
        if !keep_existing {
            self.metadata.insert(field, (value, bare));
        }
    }

    fn metadata_field(&self, key: &str) -> Option<String> {
        const FIXED: &[&str] = &[
            "id",
            "title",
            "description",
            "content",
            "status",
            "url",
            "version",
        ];
        if let Some(fixed) = FIXED.iter().find(|f| f.eq_ignore_ascii_case(key)) {
            return Some(fixed.to_string());
        }
        self.options
            .extra_fields
            .iter()
            .find(|f| f.eq_ignore_ascii_case(key))
            .cloned()
    }

    fn on_definition(&mut self, number: usize, rule: GroupRule<'_>) {
        if rule.group != Group::Property {
            self.warn(
                number,
                WarningKind::UnknownField {
                    group: rule.group,
                    field: rule.field.to_string(),
                },
            );
            return;
        }

        let index = self
            .cursors
            .resolve(&Owner::CodeSystem, Group::Property, rule.index);
        let value = decode_value(rule.value);
        let slot = slot_mut(&mut self.definitions, index);
        match rule.field {
            "code" => slot.code = Some(value),
            "uri" => slot.uri = Some(value),
            "description" => slot.description = Some(value),
            "type" => slot.value_type = Some(value),
            other => {
                let field = other.to_string();
                self.warn(
                    number,
                    WarningKind::UnknownField {
                        group: Group::Property,
                        field,
                    },
                );
            }
        }
    }

    fn on_code(&mut self, number: usize, code: &str, display: String, definition: Option<String>) {
        tracing::debug!("line {}: code block #{}", number, code);
        if let Some(existing) = self.code_system.codes.get_mut(code) {
            existing.display = display;
            existing.definition = definition;
            self.warn(number, WarningKind::DuplicateCode(code.to_string()));
            return;
        }

        let mut entry = Code::new(code, display);
        entry.definition = definition;
        self.code_system.codes.insert(code.to_string(), entry);
    }

    fn on_code_rule(&mut self, number: usize, code: &str, rule: GroupRule<'_>) -> Result<()> {
        if self.state != State::Codes || !self.code_system.codes.contains_key(code) {
            return Err(Error::UnknownCode {
                line: number,
                code: code.to_string(),
            });
        }

        let owner = Owner::Code(code.to_string());
        let index = self.cursors.resolve(&owner, rule.group, rule.index);
        let value = decode_value(rule.value);

        match rule.group {
            Group::Property => self.on_code_property(number, code, index, rule.field, value),
            Group::Designation => self.on_designation(number, code, index, rule.field, value),
        }
        Ok(())
    }

    fn on_code_property(&mut self, number: usize, code: &str, index: usize, field: &str, value: String) {
        let slots = self.pending_properties.entry(code.to_string()).or_default();
        let slot = slot_mut(slots, index);

        if field == "code" {
            slot.code = Some(value);
        } else if field.len() > "value".len() && field.starts_with("value") {
            slot.value = Some(value);
        } else {
            self.warn(
                number,
                WarningKind::UnknownField {
                    group: Group::Property,
                    field: field.to_string(),
                },
            );
            return;
        }

        // Commit once both halves are known; a later line may overwrite
        if let (Some(name), Some(value)) = (&slot.code, &slot.value) {
            if let Some(entry) = self.code_system.codes.get_mut(code) {
                entry.properties.insert(name.clone(), value.clone());
            }
        }
    }

    fn on_designation(&mut self, number: usize, code: &str, index: usize, field: &str, value: String) {
        let Some(entry) = self.code_system.codes.get_mut(code) else {
            return;
        };
        let designation = slot_mut(&mut entry.designations, index);
        match field {
            "value" => designation.value = value,
            "language" => designation.language = Some(value),
            "use" => designation.use_ = Some(value),
            other => {
                let field = other.to_string();
                self.warn(
                    number,
                    WarningKind::UnknownField {
                        group: Group::Designation,
                        field,
                    },
                );
            }
        }
    }

    fn finish(mut self) -> ParsedCodeSystem {
        if !self.declared {
            let warning = ParseWarning {
                line: None,
                kind: WarningKind::MissingHeader,
            };
            tracing::warn!("{}", warning);
            self.warnings.push(warning);
        }

        let metadata = std::mem::take(&mut self.metadata);
        for (field, (value, _)) in metadata {
            let cs = &mut self.code_system;
            match field.as_str() {
                "id" => cs.id = value,
                "title" => cs.title = value,
                "description" => cs.description = value,
                "content" => cs.content_mode = value,
                "status" => cs.status = value,
                "url" => cs.url = value,
                "version" => cs.version = value,
                _ => {
                    cs.extra.insert(field, value);
                }
            }
        }

        let definitions = std::mem::take(&mut self.definitions);
        for (index, pending) in definitions.into_iter().enumerate() {
            let Some(code) = pending.code else {
                let warning = ParseWarning {
                    line: None,
                    kind: WarningKind::DefinitionWithoutCode(index),
                };
                tracing::warn!("{}", warning);
                self.warnings.push(warning);
                continue;
            };
            let value_type = pending
                .value_type
                .map(PropertyType::from)
                .unwrap_or(PropertyType::String);
            let definition = PropertyDefinition {
                code: code.clone(),
                uri: pending.uri,
                description: pending.description,
                value_type,
            };
            self.code_system.properties.insert(code, definition);
        }

        for code in self.code_system.codes.values_mut() {
            code.sync_status();
        }

        tracing::debug!(
            "Parsed CodeSystem '{}': {} codes, {} property definitions, {} warnings",
            self.code_system.name,
            self.code_system.codes.len(),
            self.code_system.properties.len(),
            self.warnings.len()
        );

        ParsedCodeSystem {
            code_system: self.code_system,
            warnings: self.warnings,
        }
    }
}

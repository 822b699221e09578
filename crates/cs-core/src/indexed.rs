//! Indexed repeating groups (`^property[0]`, `^designation[+]`, ...)
//!
//! FSH represents arrays of records without nested syntax: every rule line
//! addresses one field of one array entry through an index token that is
//! either absolute, `=` (same entry as the previous line) or `+` (the entry
//! after the previous line). Decoding therefore needs a cursor per
//! (owner, group) pair; [`Cursors`] holds those explicitly.
//!
//! The same machinery serves the property definitions of the code system and
//! the property values and designations of every code.

use crate::model::PropertyType;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Marker that prefixes coded values (`#active`)
pub const CODE_MARKER: char = '#';
/// Index token addressing the entry of the previous line
pub const REPEAT_MARKER: &str = "=";
/// Index token addressing the entry after the previous line
pub const INCREMENT_MARKER: &str = "+";

/// Position of a rule within its group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexToken {
    /// Explicit 0-based position
    Absolute(usize),
    /// `=`
    Repeat,
    /// `+`
    Increment,
}

impl FromStr for IndexToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            REPEAT_MARKER => Ok(IndexToken::Repeat),
            INCREMENT_MARKER => Ok(IndexToken::Increment),
            other => other
                .parse::<usize>()
                .map(IndexToken::Absolute)
                .map_err(|_| other.to_string()),
        }
    }
}

impl fmt::Display for IndexToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexToken::Absolute(i) => write!(f, "{}", i),
            IndexToken::Repeat => f.write_str(REPEAT_MARKER),
            IndexToken::Increment => f.write_str(INCREMENT_MARKER),
        }
    }
}

/// Repeating groups understood by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {
    Property,
    Designation,
}

impl Group {
    /// Element name as written after `^`
    pub fn as_str(self) -> &'static str {
        match self {
            Group::Property => "property",
            Group::Designation => "designation",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "property" => Some(Group::Property),
            "designation" => Some(Group::Designation),
            _ => None,
        }
    }
}

/// Entity that owns a group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    /// The code system itself (property definitions)
    CodeSystem,
    /// A single code, by value
    Code(String),
}

/// Last resolved index per (owner, group)
#[derive(Debug, Clone, Default)]
pub struct Cursors {
    last: HashMap<(Owner, Group), usize>,
}

impl Cursors {
    /// Create an empty cursor set
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an index token to an absolute position and move the cursor there.
    ///
    /// A leading `=` or `+` (no earlier line in the same scope) resolves to 0.
    pub fn resolve(&mut self, owner: &Owner, group: Group, token: IndexToken) -> usize {
        let key = (owner.clone(), group);
        let index = match (token, self.last.get(&key)) {
            (IndexToken::Absolute(i), _) => i,
            (IndexToken::Repeat, Some(&last)) => last,
            (IndexToken::Increment, Some(&last)) => last + 1,
            (IndexToken::Repeat | IndexToken::Increment, None) => 0,
        };
        self.last.insert(key, index);
        index
    }

    /// Last resolved index for a scope, if any
    pub fn last(&self, owner: &Owner, group: Group) -> Option<usize> {
        self.last.get(&(owner.clone(), group)).copied()
    }
}

/// One decoded `^group[index].field = value` rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRule<'a> {
    pub group: Group,
    pub index: IndexToken,
    pub field: &'a str,
    /// Raw value text, still quoted or `#`-prefixed
    pub value: &'a str,
}

/// Why a caret rule could not be read as a group rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRuleError {
    /// Not of the `^name[index].field = value` shape
    NotAGroupRule,
    /// Shape matches but the element is not a known group
    UnknownGroup(String),
    /// Index token is neither an integer, `=` nor `+`
    InvalidIndex(String),
}

/// Read a caret rule such as `^designation[+].language = "de"`.
pub fn parse_group_rule(text: &str) -> Result<GroupRule<'_>, GroupRuleError> {
    let rest = text
        .trim()
        .strip_prefix('^')
        .ok_or(GroupRuleError::NotAGroupRule)?;
    let (name, rest) = rest.split_once('[').ok_or(GroupRuleError::NotAGroupRule)?;
    // `^description: "a[0].b = c"` is metadata, not a group
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GroupRuleError::NotAGroupRule);
    }
    let (index, rest) = rest.split_once(']').ok_or(GroupRuleError::NotAGroupRule)?;
    let rest = rest.strip_prefix('.').ok_or(GroupRuleError::NotAGroupRule)?;
    let (field, value) = rest.split_once('=').ok_or(GroupRuleError::NotAGroupRule)?;

    let field = field.trim();
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GroupRuleError::NotAGroupRule);
    }

    let group =
        Group::from_name(name).ok_or_else(|| GroupRuleError::UnknownGroup(name.to_string()))?;
    let index = index.parse().map_err(GroupRuleError::InvalidIndex)?;

    Ok(GroupRule {
        group,
        index,
        field,
        value: value.trim(),
    })
}

/// Get the entry at `index`, padding with default entries up to it
pub fn slot_mut<T: Default>(entries: &mut Vec<T>, index: usize) -> &mut T {
    if entries.len() <= index {
        entries.resize_with(index + 1, T::default);
    }
    &mut entries[index]
}

/// Remove surrounding quotes and resolve `\"`, `\\` and `\n` escapes.
///
/// Text that is not a complete quoted string is returned unchanged.
pub fn unquote(value: &str) -> String {
    let inner = match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) if value.len() >= 2 => inner,
        _ => return value.to_string(),
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped @ ('"' | '\\')) => out.push(escaped),
                Some('n') => out.push('\n'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Wrap a value in quotes, escaping `"`, `\` and newlines
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Decode a raw rule value: quoted strings are unquoted, coded tokens lose
/// their leading `#`, anything else (booleans, numbers, `system#code`) is
/// kept as written.
pub fn decode_value(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with('"') {
        unquote(raw)
    } else if let Some(code) = raw.strip_prefix(CODE_MARKER) {
        unquote(code)
    } else {
        raw.to_string()
    }
}

/// Render a code token: `#code`, or `#"code"` when it would not read back
/// as a single bare token.
pub fn format_code(code: &str) -> String {
    if code.is_empty() || code.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("{}{}", CODE_MARKER, quote(code))
    } else {
        format!("{}{}", CODE_MARKER, code)
    }
}

/// Format a value for output according to its declared type
pub fn format_value(value: &str, value_type: &PropertyType) -> String {
    match value_type {
        PropertyType::Code => format!("{}{}", CODE_MARKER, value),
        PropertyType::Coding if value.contains(CODE_MARKER) => value.to_string(),
        PropertyType::Coding => format!("{}{}", CODE_MARKER, value),
        PropertyType::String | PropertyType::Uri => quote(value),
        PropertyType::Other(_) => value.to_string(),
    }
}

/// Render a group as rule lines.
///
/// `fields` yields the (field name, formatted value) pairs of one entry. The
/// first field of entry `i` is addressed as `[i]`, every following field as
/// `[=]`. Positions start at 0 on every call, so each owner and group is
/// numbered independently.
pub fn encode_group<T, F>(prefix: &str, group: Group, entries: &[T], fields: F) -> Vec<String>
where
    F: Fn(&T) -> Vec<(String, String)>,
{
    let mut lines = Vec::new();
    for (position, entry) in entries.iter().enumerate() {
        for (n, (field, value)) in fields(entry).into_iter().enumerate() {
            let index = if n == 0 {
                IndexToken::Absolute(position)
            } else {
                IndexToken::Repeat
            };
            lines.push(format!(
                "{}^{}[{}].{} = {}",
                prefix,
                group.as_str(),
                index,
                field,
                value
            ));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<IndexToken> {
        raw.iter().map(|t| t.parse().unwrap()).collect()
    }

    #[test]
    fn test_parse_index_tokens() {
        assert_eq!("0".parse::<IndexToken>(), Ok(IndexToken::Absolute(0)));
        assert_eq!("12".parse::<IndexToken>(), Ok(IndexToken::Absolute(12)));
        assert_eq!("=".parse::<IndexToken>(), Ok(IndexToken::Repeat));
        assert_eq!("+".parse::<IndexToken>(), Ok(IndexToken::Increment));
        assert_eq!("x".parse::<IndexToken>(), Err("x".to_string()));
        assert_eq!("-1".parse::<IndexToken>(), Err("-1".to_string()));
    }

    #[test]
    fn test_resolve_repeat_and_increment() {
        let mut cursors = Cursors::new();
        let owner = Owner::Code("A".to_string());

        let resolved: Vec<usize> = tokens(&["0", "=", "+", "=", "+"])
            .into_iter()
            .map(|t| cursors.resolve(&owner, Group::Designation, t))
            .collect();

        assert_eq!(resolved, vec![0, 0, 1, 1, 2]);
    }

    #[test]
    fn test_absolute_index_moves_cursor() {
        let mut cursors = Cursors::new();
        let owner = Owner::CodeSystem;

        let resolved: Vec<usize> = tokens(&["3", "+", "1", "="])
            .into_iter()
            .map(|t| cursors.resolve(&owner, Group::Property, t))
            .collect();

        assert_eq!(resolved, vec![3, 4, 1, 1]);
    }

    #[test]
    fn test_leading_increment_or_repeat_starts_at_zero() {
        let mut cursors = Cursors::new();
        let a = Owner::Code("A".to_string());
        let b = Owner::Code("B".to_string());

        assert_eq!(cursors.resolve(&a, Group::Designation, IndexToken::Increment), 0);
        assert_eq!(cursors.resolve(&a, Group::Designation, IndexToken::Increment), 1);
        assert_eq!(cursors.resolve(&b, Group::Designation, IndexToken::Repeat), 0);
    }

    #[test]
    fn test_scopes_do_not_share_cursors() {
        let mut cursors = Cursors::new();
        let a = Owner::Code("A".to_string());
        let b = Owner::Code("B".to_string());

        cursors.resolve(&Owner::CodeSystem, Group::Property, IndexToken::Absolute(5));
        cursors.resolve(&a, Group::Property, IndexToken::Absolute(2));
        cursors.resolve(&a, Group::Designation, IndexToken::Absolute(0));

        // Each scope continues from its own cursor
        assert_eq!(cursors.resolve(&a, Group::Property, IndexToken::Increment), 3);
        assert_eq!(cursors.resolve(&a, Group::Designation, IndexToken::Increment), 1);
        assert_eq!(cursors.resolve(&b, Group::Property, IndexToken::Increment), 0);
        assert_eq!(
            cursors.resolve(&Owner::CodeSystem, Group::Property, IndexToken::Repeat),
            5
        );
        assert_eq!(cursors.last(&b, Group::Designation), None);
    }

    #[test]
    fn test_parse_group_rule() {
        let rule = parse_group_rule("^property[+].valueCode = #draft").unwrap();
        assert_eq!(rule.group, Group::Property);
        assert_eq!(rule.index, IndexToken::Increment);
        assert_eq!(rule.field, "valueCode");
        assert_eq!(rule.value, "#draft");

        let rule = parse_group_rule("^designation[0].value = \"a = b\"").unwrap();
        assert_eq!(rule.group, Group::Designation);
        assert_eq!(rule.index, IndexToken::Absolute(0));
        assert_eq!(rule.value, "\"a = b\"");
    }

    #[test]
    fn test_parse_group_rule_errors() {
        assert_eq!(
            parse_group_rule("^status = #draft"),
            Err(GroupRuleError::NotAGroupRule)
        );
        assert_eq!(
            parse_group_rule("^contact[0].name = \"x\""),
            Err(GroupRuleError::UnknownGroup("contact".to_string()))
        );
        assert_eq!(
            parse_group_rule("^property[x].code = #a"),
            Err(GroupRuleError::InvalidIndex("x".to_string()))
        );
        assert_eq!(
            parse_group_rule("^description: \"see a[0].b = c\""),
            Err(GroupRuleError::NotAGroupRule)
        );
    }

    #[test]
    fn test_slot_mut_pads_with_defaults() {
        let mut entries: Vec<String> = Vec::new();
        *slot_mut(&mut entries, 2) = "c".to_string();
        assert_eq!(entries, vec![String::new(), String::new(), "c".to_string()]);

        *slot_mut(&mut entries, 0) = "a".to_string();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], "a");
    }

    #[test]
    fn test_decode_value() {
        assert_eq!(decode_value("#draft"), "draft");
        assert_eq!(decode_value("\"Alpha beta\""), "Alpha beta");
        assert_eq!(decode_value("\"say \\\"hi\\\"\""), "say \"hi\"");
        assert_eq!(decode_value("true"), "true");
        assert_eq!(decode_value("http://loinc.org#LA1-2"), "http://loinc.org#LA1-2");
        assert_eq!(decode_value("#\"two words\""), "two words");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("a \"b\" \\ c"), "\"a \\\"b\\\" \\\\ c\"");
        assert_eq!(unquote(&quote("a \"b\" \\ c")), "a \"b\" \\ c");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(quote("two\nlines"), "\"two\\nlines\"");
        assert_eq!(unquote(&quote("two\nlines")), "two\nlines");
    }

    #[test]
    fn test_format_value_by_type() {
        assert_eq!(format_value("abc", &PropertyType::Code), "#abc");
        assert_eq!(format_value("abc", &PropertyType::String), "\"abc\"");
        assert_eq!(format_value("http://x", &PropertyType::Uri), "\"http://x\"");
        assert_eq!(format_value("abc", &PropertyType::Coding), "#abc");
        assert_eq!(format_value("http://sct#123", &PropertyType::Coding), "http://sct#123");
        assert_eq!(
            format_value("true", &PropertyType::Other("boolean".to_string())),
            "true"
        );
    }

    #[test]
    fn test_format_code_quotes_when_needed() {
        assert_eq!(format_code("A-1"), "#A-1");
        assert_eq!(format_code("not applicable"), "#\"not applicable\"");
        assert_eq!(format_code("say \"hi\""), "#\"say \\\"hi\\\"\"");
        assert_eq!(format_code("tab\tbed"), "#\"tab\tbed\"");
    }

    #[test]
    fn test_encode_group_numbers_entries() {
        let entries = vec![("a", "en"), ("b", "de")];
        let lines = encode_group("* #X ", Group::Designation, &entries, |(value, lang)| {
            vec![
                ("value".to_string(), quote(value)),
                ("language".to_string(), quote(lang)),
            ]
        });

        assert_eq!(
            lines,
            vec![
                "* #X ^designation[0].value = \"a\"",
                "* #X ^designation[=].language = \"en\"",
                "* #X ^designation[1].value = \"b\"",
                "* #X ^designation[=].language = \"de\"",
            ]
        );
    }

    #[test]
    fn test_encoded_group_decodes_to_same_positions() {
        let entries = vec![1, 2, 3];
        let lines = encode_group("* ", Group::Property, &entries, |n| {
            vec![
                ("code".to_string(), format!("#p{}", n)),
                ("type".to_string(), "#string".to_string()),
            ]
        });

        let mut cursors = Cursors::new();
        let positions: Vec<usize> = lines
            .iter()
            .map(|l| {
                let rule = parse_group_rule(l.trim_start_matches("* ")).unwrap();
                cursors.resolve(&Owner::CodeSystem, rule.group, rule.index)
            })
            .collect();

        assert_eq!(positions, vec![0, 0, 1, 1, 2, 2]);
    }
}

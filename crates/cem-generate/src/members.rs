//! Field, method and attribute derivation helpers.

use cem_schema::{Parameter, Privacy, Type};

/// How a `@property` decorator names (or suppresses) its attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOption {
    /// `attribute: 'some-name'`
    Named(String),
    /// `attribute: false`
    Suppressed,
}

/// Attribute name for a field, per DOM convention.
///
/// An explicit name always wins; `attribute: false` suppresses emission;
/// otherwise an all-lowercase field name is used as-is and anything else
/// converts to kebab-case.
#[must_use]
pub fn derive_attribute_name(field_name: &str, option: Option<&AttributeOption>) -> Option<String> {
    match option {
        Some(AttributeOption::Named(name)) => Some(name.clone()),
        Some(AttributeOption::Suppressed) => None,
        None => {
            if field_name.chars().any(|c| c.is_ascii_uppercase()) {
                Some(kebab_case(field_name))
            } else {
                Some(field_name.to_lowercase())
            }
        }
    }
}

/// `myLongProp` -> `my-long-prop`.
#[must_use]
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Privacy from an accessibility modifier or a `#private` name.
#[must_use]
pub fn privacy_of(name: &str, access: Option<&str>) -> Option<Privacy> {
    if name.starts_with('#') {
        return Some(Privacy::Private);
    }
    match access {
        Some("private") => Some(Privacy::Private),
        Some("protected") => Some(Privacy::Protected),
        Some("public") => Some(Privacy::Public),
        _ => None,
    }
}

/// Parse a `formal_parameters` source slice (`(a: string, b = 2)`) into
/// manifest parameters. Splitting happens at depth-zero commas so object
/// types and generic arguments stay intact.
#[must_use]
pub fn parse_parameters(params_text: &str) -> Vec<Parameter> {
    let inner = params_text
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')');
    split_top_level(inner)
        .into_iter()
        .filter_map(|part| parse_parameter(part.trim()))
        .collect()
}

fn parse_parameter(part: &str) -> Option<Parameter> {
    if part.is_empty() {
        return None;
    }
    let part = part.strip_prefix("...").unwrap_or(part);

    let (before_default, _default) = split_once_top_level(part, '=');
    let (name_part, type_part) = split_once_top_level(before_default.trim(), ':');

    let name = name_part.trim().trim_end_matches('?').trim();
    if name.is_empty() {
        return None;
    }
    Some(Parameter {
        name: name.to_string(),
        type_: type_part
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Type::new),
        description: None,
    })
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn split_once_top_level(text: &str, separator: char) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth -= 1,
            c if c == separator && depth == 0 => {
                return (&text[..i], Some(&text[i + c.len_utf8()..]));
            }
            _ => {}
        }
    }
    (text, None)
}

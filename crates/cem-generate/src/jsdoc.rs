//! JSDoc block parsing and tag extraction.
//!
//! Blocks are parsed with the JSDoc grammar, then each tag's free text is
//! split into name / type / description by the conventions custom-element
//! authors actually use: `@slot name - description`,
//! `@cssprop [--name=default] - description`, `@fires {Type} name - desc`.

use cem_common::{ErrorList, Result};
use cem_query::{CaptureRecord, Grammar, parent_captures};
use cem_schema::{
    Attribute, CssCustomProperty, CssPart, CssState, Deprecated, Event, Slot, Type,
};

use crate::setup::SetupContext;

/// One `@param` entry on a method or function doc.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamDoc {
    pub name: String,
    pub type_: Option<String>,
    pub description: Option<String>,
}

/// Everything a JSDoc block can contribute to a declaration.
#[derive(Debug, Clone, Default)]
pub struct JsdocInfo {
    pub description: Option<String>,
    pub summary: Option<String>,
    pub deprecated: Option<Deprecated>,
    pub attributes: Vec<Attribute>,
    pub events: Vec<Event>,
    pub slots: Vec<Slot>,
    pub css_properties: Vec<CssCustomProperty>,
    pub css_parts: Vec<CssPart>,
    pub css_states: Vec<CssState>,
    pub params: Vec<ParamDoc>,
    pub returns: Option<ParamDoc>,
}

/// Parse a `/** ... */` comment. `anchor_byte` stamps the contributed
/// slots/parts/properties so they keep a stable in-module sort position.
pub fn parse_jsdoc(setup: &SetupContext, comment: &str, anchor_byte: u32) -> Result<JsdocInfo> {
    let mut info = JsdocInfo::default();
    if !comment.starts_with("/**") {
        return Ok(info);
    }

    let tree = setup.pools.parse(Grammar::Jsdoc, comment.as_bytes())?;
    let source = comment.as_bytes();

    let doc = cem_query::CaptureMap::collect(&setup.queries.jsdoc.document, tree.root_node(), source, None);
    if let Some(description) = doc.first("doc.description") {
        let text = clean_doc_text(&description.text);
        if !text.is_empty() {
            info.description = Some(text);
        }
    }

    for tag in parent_captures(&setup.queries.jsdoc.document, tree.root_node(), source, "tag", None)
    {
        apply_tag(&mut info, &tag, anchor_byte);
    }
    Ok(info)
}

fn apply_tag(info: &mut JsdocInfo, tag: &cem_query::CaptureGroup, anchor_byte: u32) {
    let Some(name) = tag.first("tag.name") else {
        return;
    };
    let type_text = tag.first("tag.type").map(|t| t.text.clone());
    let text = tag
        .first("tag.description")
        .map(|d| clean_doc_text(&d.text))
        .unwrap_or_default();

    match name.text.as_str() {
        "@summary" => {
            if !text.is_empty() {
                info.summary = Some(text);
            }
        }
        "@deprecated" => {
            info.deprecated = Some(Deprecated::from(text.as_str()));
        }
        "@since" => {
            // The manifest schema has no field for this; tolerated so the
            // rest of the block still merges.
            tracing::trace!(version = %text, "ignoring @since tag");
        }
        "@slot" => {
            let (slot_name, description) = split_name_desc(&text);
            info.slots.push(Slot {
                name: slot_name,
                description,
                start_byte: anchor_byte,
                ..Slot::default()
            });
        }
        "@csspart" => {
            let (part_name, description) = split_name_desc(&text);
            info.css_parts.push(CssPart {
                name: part_name,
                description,
                start_byte: anchor_byte,
                ..CssPart::default()
            });
        }
        "@cssstate" => {
            let (state_name, description) = split_name_desc(&text);
            info.css_states.push(CssState {
                name: state_name,
                description,
                start_byte: anchor_byte,
                ..CssState::default()
            });
        }
        "@cssprop" | "@cssproperty" => {
            if let Some(property) = parse_cssprop(&text, anchor_byte) {
                info.css_properties.push(property);
            }
        }
        "@fires" | "@event" => {
            let (event_name, description) = split_name_desc(&text);
            if !event_name.is_empty() {
                info.events.push(Event {
                    name: event_name,
                    type_: type_text.map(Type::new),
                    description,
                    ..Event::default()
                });
            }
        }
        "@attr" | "@attribute" => {
            let (attr_name, description) = split_name_desc(&text);
            if !attr_name.is_empty() {
                info.attributes.push(Attribute {
                    name: attr_name,
                    type_: type_text.map(Type::new),
                    description,
                    ..Attribute::default()
                });
            }
        }
        "@param" => {
            let (param_name, description) = split_name_desc(&text);
            if !param_name.is_empty() {
                info.params.push(ParamDoc {
                    name: param_name,
                    type_: type_text,
                    description,
                });
            }
        }
        "@returns" | "@return" => {
            info.returns = Some(ParamDoc {
                name: String::new(),
                type_: type_text,
                description: (!text.is_empty()).then_some(text),
            });
        }
        other => {
            tracing::trace!(tag = other, "unhandled jsdoc tag");
        }
    }
}

/// `name - description`, `- description` (empty name), or bare `name`.
fn split_name_desc(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return (String::new(), None);
    }
    if let Some(rest) = trimmed.strip_prefix('-') {
        let rest = rest.trim();
        return (String::new(), (!rest.is_empty()).then(|| rest.to_string()));
    }
    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (trimmed, ""),
    };
    let rest = rest.strip_prefix('-').map(str::trim).unwrap_or(rest);
    (
        name.to_string(),
        (!rest.is_empty()).then(|| rest.to_string()),
    )
}

/// `[--name=default] - desc` or `--name - desc`.
fn parse_cssprop(text: &str, anchor_byte: u32) -> Option<CssCustomProperty> {
    let trimmed = text.trim();
    let (head, rest) = if let Some(stripped) = trimmed.strip_prefix('[') {
        let (inner, rest) = stripped.split_once(']')?;
        (inner.trim(), rest.trim())
    } else {
        match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (trimmed, ""),
        }
    };

    let (name, default) = match head.split_once('=') {
        Some((name, default)) => (name.trim(), Some(default.trim().to_string())),
        None => (head, None),
    };
    if !name.starts_with("--") {
        return None;
    }

    let description = rest.strip_prefix('-').map(str::trim).unwrap_or(rest);
    Some(CssCustomProperty {
        name: name.to_string(),
        default,
        description: (!description.is_empty()).then(|| description.to_string()),
        start_byte: anchor_byte,
        ..CssCustomProperty::default()
    })
}

/// Strip the `* ` line prefixes a block comment carries.
pub fn clean_doc_text(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        let trimmed = trimmed.strip_prefix('*').map_or(trimmed, |rest| {
            rest.strip_prefix(' ').unwrap_or(rest)
        });
        lines.push(trimmed.trim_end());
    }
    lines.join("\n").trim().to_string()
}

/// Accumulate errors while parsing many blocks; a bad block never aborts.
pub fn parse_jsdoc_lenient(
    setup: &SetupContext,
    comment: &CaptureRecord,
    errors: &mut ErrorList,
) -> JsdocInfo {
    match parse_jsdoc(setup, &comment.text, comment.start_byte) {
        Ok(info) => info,
        Err(error) => {
            errors.push(error);
            JsdocInfo::default()
        }
    }
}

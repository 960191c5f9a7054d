//! Slot and part extraction from render templates.
//!
//! The HTML inside a `render()` tagged template is parsed with the HTML
//! grammar; `<slot>` elements and `part="..."` attributes become manifest
//! features. A comment immediately preceding the element documents it,
//! parsed as YAML (see [`crate::yaml_doc`]).

use cem_common::{Error, ErrorList};
use cem_query::{CaptureGroup, CaptureMap, CaptureRecord, Grammar, parent_captures};
use cem_schema::{CssPart, Slot};

use crate::setup::SetupContext;
use crate::yaml_doc::{DocKind, DocMeta, parse_comment_doc};

/// Features extracted from one template.
#[derive(Debug, Default)]
pub struct TemplateFeatures {
    pub slots: Vec<Slot>,
    pub parts: Vec<CssPart>,
}

/// Extract slots and parts from `html`. `offset` translates local byte
/// positions into module-file coordinates.
pub fn extract_template_features(
    setup: &SetupContext,
    html: &str,
    offset: u32,
) -> (TemplateFeatures, ErrorList) {
    let mut features = TemplateFeatures::default();
    let mut errors = ErrorList::new();

    let tree = match setup.pools.parse(Grammar::Html, html.as_bytes()) {
        Ok(tree) => tree,
        Err(error) => {
            errors.push(error);
            return (features, errors);
        }
    };
    let source = html.as_bytes();
    let query = &setup.queries.html.slots_and_parts;

    let comments: Vec<CaptureRecord> = CaptureMap::collect(query, tree.root_node(), source, None)
        .all("comment")
        .to_vec();

    for group in parent_captures(query, tree.root_node(), source, "slot", None) {
        let Some(tag) = group.first("slot.tag") else {
            continue;
        };
        if tag.text != "slot" {
            continue;
        }
        let doc = preceding_doc(&comments, html, &group, DocKind::Slot, &mut errors);
        let name = attribute_value(&group, "slot.attr.name", "slot.attr.value", "name")
            .unwrap_or_default();
        features.slots.push(Slot {
            name,
            description: doc.description,
            summary: doc.summary,
            deprecated: doc.deprecated,
            start_byte: offset + group.anchor.start_byte,
        });
    }

    for group in parent_captures(query, tree.root_node(), source, "part", None) {
        let Some(value) = attribute_value(&group, "part.attr.name", "part.attr.value", "part")
        else {
            continue;
        };
        let doc = preceding_doc(&comments, html, &group, DocKind::Part, &mut errors);
        // part="a b c" is one part per whitespace-separated token, all
        // sharing the comment's documentation.
        for token in value.split_ascii_whitespace() {
            features.parts.push(CssPart {
                name: token.to_string(),
                description: doc.description.clone(),
                summary: doc.summary.clone(),
                deprecated: doc.deprecated.clone(),
                start_byte: offset + group.anchor.start_byte,
            });
        }
    }

    (features, errors)
}

/// The value of the attribute called `wanted`, pairing name and value
/// captures by byte position.
fn attribute_value(
    group: &CaptureGroup,
    name_capture: &str,
    value_capture: &str,
    wanted: &str,
) -> Option<String> {
    let names = group.all(name_capture);
    let values = group.all(value_capture);
    for (i, name) in names.iter().enumerate() {
        if name.text != wanted {
            continue;
        }
        let limit = names
            .get(i + 1)
            .map_or(group.anchor.end_byte, |next| next.start_byte);
        return values
            .iter()
            .find(|v| v.start_byte > name.end_byte && v.start_byte < limit)
            .map(|v| v.text.clone());
    }
    None
}

/// Documentation from the nearest comment directly above the element:
/// only whitespace may separate the comment from the anchor.
fn preceding_doc(
    comments: &[CaptureRecord],
    html: &str,
    group: &CaptureGroup,
    kind: DocKind,
    errors: &mut ErrorList,
) -> DocMeta {
    let anchor_start = group.anchor.start_byte as usize;
    let candidate = comments
        .iter()
        .rev()
        .find(|comment| (comment.end_byte as usize) <= anchor_start);
    let Some(comment) = candidate else {
        return DocMeta::default();
    };
    let between = &html[comment.end_byte as usize..anchor_start];
    if !between.chars().all(char::is_whitespace) {
        return DocMeta::default();
    }
    match parse_comment_doc(&comment.text, kind) {
        Ok(meta) => meta,
        Err(error) => {
            errors.push(Error::component("doc comment", comment.text.clone(), error));
            DocMeta::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> SetupContext {
        SetupContext::new(1).unwrap()
    }

    #[test]
    fn named_and_default_slots_extract() {
        let (features, errors) = extract_template_features(
            &setup(),
            "<slot name=\"header\"></slot><slot></slot>",
            0,
        );
        assert!(errors.is_empty());
        assert_eq!(features.slots.len(), 2);
        assert_eq!(features.slots[0].name, "header");
        assert_eq!(features.slots[1].name, "");
    }

    #[test]
    fn slot_doc_comment_parses_as_yaml() {
        let html = "<!-- slot: { summary: \"header slot\", deprecated: \"use heading\" } -->\n<slot name=\"header\"></slot>";
        let (features, errors) = extract_template_features(&setup(), html, 0);
        assert!(errors.is_empty());
        let slot = &features.slots[0];
        assert_eq!(slot.name, "header");
        assert_eq!(slot.summary.as_deref(), Some("header slot"));
        assert_eq!(
            slot.deprecated,
            Some(cem_schema::Deprecated::Reason("use heading".into()))
        );
    }

    #[test]
    fn part_tokens_split_and_share_docs() {
        let html = "<!-- part: { summary: chrome } -->\n<div part=\"a b\"></div>";
        let (features, errors) = extract_template_features(&setup(), html, 0);
        assert!(errors.is_empty());
        assert_eq!(features.parts.len(), 2);
        assert_eq!(features.parts[0].name, "a");
        assert_eq!(features.parts[1].name, "b");
        assert_eq!(features.parts[0].summary.as_deref(), Some("chrome"));
        assert_eq!(features.parts[1].summary.as_deref(), Some("chrome"));
    }

    #[test]
    fn offsets_move_into_file_coordinates() {
        let (features, _) = extract_template_features(&setup(), "<slot></slot>", 100);
        assert_eq!(features.slots[0].start_byte, 100);
    }

    #[test]
    fn malformed_yaml_reports_but_extraction_continues() {
        let html = "<!-- slot: [unclosed -->\n<slot name=\"x\"></slot>";
        let (features, errors) = extract_template_features(&setup(), html, 0);
        assert_eq!(features.slots.len(), 1);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn intervening_markup_detaches_the_comment() {
        let html = "<!-- slot: { summary: s } --><div></div><slot></slot>";
        let (features, _) = extract_template_features(&setup(), html, 0);
        assert!(features.slots[0].summary.is_none());
    }
}

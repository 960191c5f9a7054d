//! YAML documentation blocks inside HTML comments.
//!
//! Template authors document slots and parts with a comment immediately
//! before the element:
//!
//! ```html
//! <!-- slot:
//!        summary: header slot
//!        deprecated: use heading -->
//! <slot name="header"></slot>
//! ```
//!
//! The YAML may be flat (`description:`, `summary:`, `deprecated:`) or
//! nested under a `slot:` / `part:` key; the calling kind selects the
//! nested sub-document when present.

use serde::Deserialize;

use cem_common::Result;
use cem_schema::Deprecated;

/// Which feature kind the caller is documenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Slot,
    Part,
}

/// Documentation extracted from one comment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocMeta {
    pub description: Option<String>,
    pub summary: Option<String>,
    pub deprecated: Option<Deprecated>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DocYaml {
    description: Option<String>,
    summary: Option<String>,
    deprecated: Option<Deprecated>,
    slot: Option<Box<DocYaml>>,
    part: Option<Box<DocYaml>>,
}

impl DocYaml {
    fn into_meta(self, kind: DocKind) -> DocMeta {
        let nested = match kind {
            DocKind::Slot => self.slot,
            DocKind::Part => self.part,
        };
        let selected = nested.map_or(
            DocYaml {
                description: self.description,
                summary: self.summary,
                deprecated: self.deprecated,
                ..DocYaml::default()
            },
            |boxed| *boxed,
        );
        DocMeta {
            description: selected.description,
            summary: selected.summary,
            deprecated: selected.deprecated,
        }
    }
}

/// Parse an HTML comment's YAML body for the given kind.
pub fn parse_comment_doc(comment: &str, kind: DocKind) -> Result<DocMeta> {
    let body = strip_comment_delimiters(comment);
    let dedented = dedent(&body);
    if dedented.trim().is_empty() {
        return Ok(DocMeta::default());
    }
    let parsed: DocYaml = serde_yaml::from_str(&dedented)?;
    Ok(parsed.into_meta(kind))
}

fn strip_comment_delimiters(comment: &str) -> String {
    let trimmed = comment.trim();
    let trimmed = trimmed.strip_prefix("<!--").unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("-->").unwrap_or(trimmed);
    trimmed.to_string()
}

/// Remove the minimum common leading whitespace of the non-blank
/// continuation lines. The first line keeps its own (already stripped)
/// indent so `<!-- slot: ...` style comments parse.
fn dedent(body: &str) -> String {
    let mut lines = body.lines();
    let Some(first) = lines.next() else {
        return String::new();
    };
    let rest: Vec<&str> = lines.collect();

    let min_indent = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut out = String::from(first.trim_start());
    for line in rest {
        out.push('\n');
        if line.trim().is_empty() {
            continue;
        }
        out.push_str(&line[min_indent.min(line.len())..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_yaml_parses() {
        let meta = parse_comment_doc(
            "<!-- summary: header slot\ndescription: the big one -->",
            DocKind::Slot,
        )
        .unwrap();
        assert_eq!(meta.summary.as_deref(), Some("header slot"));
        assert_eq!(meta.description.as_deref(), Some("the big one"));
    }

    #[test]
    fn nested_kind_is_selected() {
        let comment = "<!-- slot: { summary: \"header slot\", deprecated: \"use heading\" } -->";
        let meta = parse_comment_doc(comment, DocKind::Slot).unwrap();
        assert_eq!(meta.summary.as_deref(), Some("header slot"));
        assert_eq!(
            meta.deprecated,
            Some(Deprecated::Reason("use heading".into()))
        );
    }

    #[test]
    fn wrong_nested_kind_falls_back_to_flat_fields() {
        // A `part:` document asked for as a slot yields the flat (empty) doc.
        let comment = "<!-- part: { summary: inner } -->";
        let meta = parse_comment_doc(comment, DocKind::Slot).unwrap();
        assert_eq!(meta, DocMeta::default());
    }

    #[test]
    fn continuation_lines_dedent_to_common_indent() {
        let comment = "<!-- slot:\n        summary: header\n        deprecated: true -->";
        let meta = parse_comment_doc(comment, DocKind::Slot).unwrap();
        assert_eq!(meta.summary.as_deref(), Some("header"));
        assert_eq!(meta.deprecated, Some(Deprecated::Flag(true)));
    }

    #[test]
    fn deprecated_keeps_bool_and_string_shapes() {
        let flag = parse_comment_doc("<!-- deprecated: true -->", DocKind::Part).unwrap();
        assert_eq!(flag.deprecated, Some(Deprecated::Flag(true)));
        let reason = parse_comment_doc("<!-- deprecated: use x -->", DocKind::Part).unwrap();
        assert_eq!(reason.deprecated, Some(Deprecated::Reason("use x".into())));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(parse_comment_doc("<!-- summary: [unclosed -->", DocKind::Slot).is_err());
    }
}

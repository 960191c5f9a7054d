//! Query results as owned capture records.
//!
//! Tree-sitter nodes borrow their tree; the extraction pipeline wants to
//! hand results between jobs, so every capture is copied out into a
//! [`CaptureRecord`] with its text and byte range. `node_id` survives so
//! records captured by different patterns can be correlated.

use rustc_hash::FxHashMap;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor};

use cem_common::{Error, Result};

/// One captured node, copied out of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub text: String,
    pub start_byte: u32,
    pub end_byte: u32,
    pub node_id: usize,
}

impl CaptureRecord {
    fn from_node(node: Node<'_>, source: &[u8]) -> Self {
        let text = node.utf8_text(source).unwrap_or_default().to_string();
        Self {
            text,
            start_byte: u32::try_from(node.start_byte()).unwrap_or(u32::MAX),
            end_byte: u32::try_from(node.end_byte()).unwrap_or(u32::MAX),
            node_id: node.id(),
        }
    }

    /// True when `other`'s byte range lies inside this record's range.
    #[must_use]
    pub fn contains(&self, other: &CaptureRecord) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }
}

/// Mapping from capture name to the ordered records captured under it.
#[derive(Debug, Default)]
pub struct CaptureMap {
    by_name: FxHashMap<String, Vec<CaptureRecord>>,
}

impl CaptureMap {
    /// Run `query` over `node` and collect every capture, optionally
    /// restricted to a byte range of the file.
    #[must_use]
    pub fn collect(
        query: &Query,
        node: Node<'_>,
        source: &[u8],
        byte_range: Option<(u32, u32)>,
    ) -> Self {
        let mut by_name: FxHashMap<String, Vec<CaptureRecord>> = FxHashMap::default();
        let mut seen: FxHashMap<u32, Vec<usize>> = FxHashMap::default();
        let names = query.capture_names();

        let mut cursor = QueryCursor::new();
        if let Some((start, end)) = byte_range {
            cursor.set_byte_range(start as usize..end as usize);
        }
        let mut matches = cursor.matches(query, node, source);
        while let Some(matched) = matches.next() {
            for capture in matched.captures {
                // Optional sub-patterns can re-yield the same node.
                let ids = seen.entry(capture.index).or_default();
                if ids.contains(&capture.node.id()) {
                    continue;
                }
                ids.push(capture.node.id());
                let name = names[capture.index as usize];
                by_name
                    .entry(name.to_string())
                    .or_default()
                    .push(CaptureRecord::from_node(capture.node, source));
            }
        }

        for records in by_name.values_mut() {
            records.sort_by_key(|r| (r.start_byte, r.end_byte));
        }
        Self { by_name }
    }

    #[must_use]
    pub fn all(&self, name: &str) -> &[CaptureRecord] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn first(&self, name: &str) -> Option<&CaptureRecord> {
        self.all(name).first()
    }

    /// First record under `name`, or a `NoCapture` error naming the query.
    pub fn required(&self, name: &str, query_name: &str) -> Result<&CaptureRecord> {
        self.first(name).ok_or_else(|| Error::NoCapture {
            capture: name.to_string(),
            query: query_name.to_string(),
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.values().all(Vec::is_empty)
    }
}

/// All captures of a query grouped under one anchor capture.
#[derive(Debug)]
pub struct CaptureGroup {
    pub anchor: CaptureRecord,
    children: FxHashMap<String, Vec<CaptureRecord>>,
}

impl CaptureGroup {
    #[must_use]
    pub fn all(&self, name: &str) -> &[CaptureRecord] {
        self.children.get(name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn first(&self, name: &str) -> Option<&CaptureRecord> {
        self.all(name).first()
    }

    pub fn required(&self, name: &str, query_name: &str) -> Result<&CaptureRecord> {
        self.first(name).ok_or_else(|| Error::NoCapture {
            capture: name.to_string(),
            query: query_name.to_string(),
        })
    }
}

/// Group a query's captures under the capture named `anchor_name`.
///
/// Matches sharing an anchor node merge into one group; child records are
/// deduplicated by node id and kept in byte order; groups come back in
/// anchor byte order.
#[must_use]
pub fn parent_captures(
    query: &Query,
    node: Node<'_>,
    source: &[u8],
    anchor_name: &str,
    byte_range: Option<(u32, u32)>,
) -> Vec<CaptureGroup> {
    let names = query.capture_names();
    let mut order: Vec<usize> = Vec::new();
    let mut groups: FxHashMap<usize, CaptureGroup> = FxHashMap::default();

    let mut cursor = QueryCursor::new();
    if let Some((start, end)) = byte_range {
        cursor.set_byte_range(start as usize..end as usize);
    }
    let mut matches = cursor.matches(query, node, source);
    while let Some(matched) = matches.next() {
        let anchor_node = matched
            .captures
            .iter()
            .find(|c| names[c.index as usize] == anchor_name)
            .map(|c| c.node);
        let Some(anchor_node) = anchor_node else {
            continue;
        };

        let group = groups
            .entry(anchor_node.id())
            .or_insert_with(|| CaptureGroup {
                anchor: CaptureRecord::from_node(anchor_node, source),
                children: FxHashMap::default(),
            });
        if !order.contains(&anchor_node.id()) {
            order.push(anchor_node.id());
        }

        for capture in matched.captures {
            let name = names[capture.index as usize];
            if name == anchor_name {
                continue;
            }
            let records = group.children.entry(name.to_string()).or_default();
            if records.iter().all(|r| r.node_id != capture.node.id()) {
                records.push(CaptureRecord::from_node(capture.node, source));
            }
        }
    }

    let mut result: Vec<CaptureGroup> = order
        .into_iter()
        .filter_map(|id| groups.remove(&id))
        .collect();
    for group in &mut result {
        for records in group.children.values_mut() {
            records.sort_by_key(|r| (r.start_byte, r.end_byte));
        }
    }
    result.sort_by_key(|g| g.anchor.start_byte);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Grammar, ParserPools};
    use crate::queries::QueryManager;

    fn parse_ts(source: &str) -> tree_sitter::Tree {
        ParserPools::new(1)
            .parse(Grammar::TypeScript, source.as_bytes())
            .unwrap()
    }

    #[test]
    fn collect_returns_ordered_records() {
        let manager = QueryManager::new().unwrap();
        let source = "import a from './a.css';\nimport b from './b.css';\n";
        let tree = parse_ts(source);
        let map = CaptureMap::collect(
            &manager.typescript.imports,
            tree.root_node(),
            source.as_bytes(),
            None,
        );

        let sources: Vec<&str> = map
            .all("import.source")
            .iter()
            .map(|r| r.text.as_str())
            .collect();
        assert_eq!(sources, ["./a.css", "./b.css"]);
        assert!(map.all("import.source")[0].start_byte < map.all("import.source")[1].start_byte);
    }

    #[test]
    fn required_reports_no_capture() {
        let manager = QueryManager::new().unwrap();
        let source = "const x = 1;\n";
        let tree = parse_ts(source);
        let map = CaptureMap::collect(
            &manager.typescript.imports,
            tree.root_node(),
            source.as_bytes(),
            None,
        );

        let error = map.required("import.source", "imports").unwrap_err();
        assert_eq!(
            error.to_string(),
            "no capture 'import.source' in query 'imports'"
        );
    }

    #[test]
    fn parent_captures_groups_members_under_their_definition() {
        let manager = QueryManager::new().unwrap();
        let source = "class A { open = false; close() {} }\n";
        let tree = parse_ts(source);
        let fields = parent_captures(
            &manager.typescript.class_members,
            tree.root_node(),
            source.as_bytes(),
            "field",
            None,
        );

        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].first("field.name").unwrap().text, "open");
    }
}

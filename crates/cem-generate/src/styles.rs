//! CSS custom property resolution and the per-session style cache.
//!
//! Two sources feed a module's `cssProperties`: inline `css` tagged
//! templates, parsed directly, and imported `.css` files, memoized
//! process-wide by absolute path. Cache entries are immutable once
//! inserted and never evicted within a session; a changed CSS file is
//! handled by the dependency tracker scheduling its consumers for a
//! rebuild in a fresh session pass.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

use cem_common::{Error, ErrorList, Result};
use cem_query::{CaptureMap, Grammar, parent_captures};
use cem_schema::CssCustomProperty;

use crate::jsdoc;
use crate::setup::SetupContext;

/// Custom properties keyed by name; merges overwrite key-by-key.
pub type CssPropsMap = BTreeMap<String, CssCustomProperty>;

/// Where a module's styles come from.
pub enum StyleSource<'a> {
    /// Inline tagged template; `offset` maps positions into the module file.
    Inline { css: &'a str, offset: u32 },
    /// An imported `.css` file.
    File(&'a Path),
}

/// Process-wide read-through cache of parsed CSS files.
pub struct StyleCache {
    entries: RwLock<FxHashMap<PathBuf, Arc<CssPropsMap>>>,
}

impl StyleCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Look a file up, parsing and inserting on first use. The lock is not
    /// held across file I/O or parsing; on a race the first insert wins so
    /// entries stay immutable.
    pub fn get_or_parse(
        &self,
        setup: &SetupContext,
        abs_path: &Path,
    ) -> Result<(Arc<CssPropsMap>, ErrorList)> {
        if let Some(cached) = self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(abs_path).cloned())
        {
            return Ok((cached, ErrorList::new()));
        }

        let css = std::fs::read_to_string(abs_path)
            .map_err(|e| Error::file_read("read css", abs_path, e))?;
        let (props, errors) = parse_css_props(setup, &css, 0);
        let props = Arc::new(props);

        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::other("style cache lock poisoned"))?;
        let entry = entries
            .entry(abs_path.to_path_buf())
            .or_insert_with(|| Arc::clone(&props));
        Ok((Arc::clone(entry), errors))
    }

    /// Drop the entry for a file whose content changed, so the next lookup
    /// re-parses. Untouched entries live for the whole session.
    pub fn invalidate(&self, abs_path: &Path) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(abs_path);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

/// Parse `--name: value` declarations out of a stylesheet.
///
/// The last occurrence of a property in source order wins for `default`.
/// JSDoc-style comments (`/** @summary ... */`) enrich the nearest
/// property by byte distance.
pub fn parse_css_props(setup: &SetupContext, css: &str, offset: u32) -> (CssPropsMap, ErrorList) {
    let mut props = CssPropsMap::new();
    let mut errors = ErrorList::new();

    let tree = match setup.pools.parse(Grammar::Css, css.as_bytes()) {
        Ok(tree) => tree,
        Err(error) => {
            errors.push(error);
            return (props, errors);
        }
    };
    let source = css.as_bytes();
    let query = &setup.queries.css.custom_properties;

    let mut ordered: Vec<CssCustomProperty> = Vec::new();
    for group in parent_captures(query, tree.root_node(), source, "property", None) {
        let Some(name) = group.first("property.name") else {
            continue;
        };
        if !name.text.starts_with("--") {
            continue;
        }
        let default = group
            .anchor
            .text
            .split_once(':')
            .map(|(_, value)| value.trim().trim_end_matches(';').trim().to_string())
            .filter(|value| !value.is_empty());
        ordered.push(CssCustomProperty {
            name: name.text.clone(),
            default,
            start_byte: offset + group.anchor.start_byte,
            ..CssCustomProperty::default()
        });
    }

    // Doc comments attach to the nearest declaration by byte distance.
    let comments = CaptureMap::collect(query, tree.root_node(), source, None);
    for comment in comments.all("comment") {
        if !comment.text.starts_with("/**") {
            continue;
        }
        let info = match jsdoc::parse_jsdoc(setup, &comment.text, comment.start_byte) {
            Ok(info) => info,
            Err(error) => {
                errors.push(error);
                continue;
            }
        };
        let comment_range = (comment.start_byte, comment.end_byte);
        let nearest = ordered.iter_mut().min_by_key(|property| {
            let local_start = property.start_byte - offset;
            byte_distance((local_start, local_start), comment_range)
        });
        if let Some(property) = nearest {
            if info.summary.is_some() {
                property.summary = info.summary;
            }
            if info.description.is_some() {
                property.description = info.description;
            }
            if info.deprecated.is_some() {
                property.deprecated = info.deprecated;
            }
        }
    }

    for property in ordered {
        props.insert(property.name.clone(), property);
    }
    (props, errors)
}

fn byte_distance(a: (u32, u32), b: (u32, u32)) -> u32 {
    if a.1 <= b.0 {
        b.0 - a.1
    } else if b.1 <= a.0 {
        a.0 - b.1
    } else {
        0
    }
}

/// Resolve every style source of a module into one merged map.
///
/// Later sources overwrite earlier ones key-by-key.
pub fn resolve_style_sources(
    setup: &SetupContext,
    cache: &StyleCache,
    sources: &[StyleSource<'_>],
) -> (CssPropsMap, ErrorList) {
    let mut merged = CssPropsMap::new();
    let mut errors = ErrorList::new();

    for source in sources {
        match source {
            StyleSource::Inline { css, offset } => {
                let (props, css_errors) = parse_css_props(setup, css, *offset);
                errors.extend(css_errors);
                merged.extend(props);
            }
            StyleSource::File(path) => match cache.get_or_parse(setup, path) {
                Ok((props, css_errors)) => {
                    errors.extend(css_errors);
                    for (name, property) in props.iter() {
                        merged.insert(name.clone(), property.clone());
                    }
                }
                Err(error) => errors.push(error),
            },
        }
    }
    (merged, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> SetupContext {
        SetupContext::new(1).unwrap()
    }

    #[test]
    fn custom_properties_extract_with_defaults() {
        let (props, errors) =
            parse_css_props(&setup(), ":host { --foo: red; color: blue; }", 0);
        assert!(errors.is_empty());
        assert_eq!(props.len(), 1);
        let foo = &props["--foo"];
        assert_eq!(foo.default.as_deref(), Some("red"));
    }

    #[test]
    fn last_declaration_wins_for_default() {
        let css = ":host { --foo: red; } :host([dark]) { --foo: black; }";
        let (props, _) = parse_css_props(&setup(), css, 0);
        assert_eq!(props["--foo"].default.as_deref(), Some("black"));
    }

    #[test]
    fn doc_comment_enriches_nearest_property() {
        let css = ":host{--foo:red;}\n/** @summary red foo */";
        let (props, errors) = parse_css_props(&setup(), css, 0);
        assert!(errors.is_empty());
        assert_eq!(props["--foo"].summary.as_deref(), Some("red foo"));
        assert_eq!(props["--foo"].default.as_deref(), Some("red"));
    }

    #[test]
    fn cache_parses_each_file_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("styles.css");
        std::fs::write(&path, ":host { --gap: 4px; }").unwrap();

        let setup = setup();
        let cache = StyleCache::new();
        let (first, _) = cache.get_or_parse(&setup, &path).unwrap();
        let (second, _) = cache.get_or_parse(&setup, &path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(first["--gap"].default.as_deref(), Some("4px"));
    }

    #[test]
    fn missing_css_file_surfaces_a_read_error() {
        let setup = setup();
        let cache = StyleCache::new();
        let result = cache.get_or_parse(&setup, Path::new("/nonexistent/styles.css"));
        assert!(result.is_err());
    }

    #[test]
    fn merge_order_is_last_writer_wins() {
        let setup = setup();
        let cache = StyleCache::new();
        let sources = [
            StyleSource::Inline {
                css: ":host { --x: 1px; --y: a; }",
                offset: 0,
            },
            StyleSource::Inline {
                css: ":host { --x: 2px; }",
                offset: 50,
            },
        ];
        let (merged, _) = resolve_style_sources(&setup, &cache, &sources);
        assert_eq!(merged["--x"].default.as_deref(), Some("2px"));
        assert_eq!(merged["--y"].default.as_deref(), Some("a"));
    }
}

//! Demo-discovery enrichment.
//!
//! Globs the configured demo files, recovers a tag name from each path,
//! and attaches a [`Demo`] to the matching custom element. Best-effort by
//! contract: errors surface but never fail the build.

use regex::Regex;

use cem_common::{Error, ErrorList};
use cem_schema::{Declaration, Demo, Package};
use cem_workspace::Workspace;

/// Attach discovered demos to their elements. No-op without configuration.
pub fn apply_demo_discovery(workspace: &Workspace, package: &mut Package) -> ErrorList {
    let mut errors = ErrorList::new();
    let Some(config) = workspace.config().generate.demo_discovery.clone() else {
        return errors;
    };
    if config.file_glob.is_empty() {
        return errors;
    }

    let demo_paths = match workspace.glob(std::slice::from_ref(&config.file_glob)) {
        Ok(paths) => paths,
        Err(error) => {
            errors.push(error);
            return errors;
        }
    };

    let pattern = match config.url_pattern.as_deref() {
        Some(pattern) => match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(error) => {
                errors.push(Error::other(format!(
                    "invalid demo url pattern '{pattern}': {error}"
                )));
                return errors;
            }
        },
        None => None,
    };

    for demo_path in demo_paths {
        let Some(tag) = tag_for_demo(&demo_path, pattern.as_ref()) else {
            tracing::debug!(path = %demo_path, "no tag recoverable from demo path");
            continue;
        };
        let url = expand_url(config.url_template.as_deref(), &tag, &demo_path);
        attach_demo(package, &tag, url);
    }
    errors
}

/// Tag from the capture group of the configured pattern, or the file stem.
fn tag_for_demo(demo_path: &str, pattern: Option<&Regex>) -> Option<String> {
    if let Some(pattern) = pattern {
        let captures = pattern.captures(demo_path)?;
        let tag = captures
            .name("tag")
            .map(|m| m.as_str())
            .or_else(|| captures.get(1).map(|m| m.as_str()))?;
        return Some(tag.to_string());
    }
    let stem = demo_path.rsplit('/').next()?.rsplit_once('.')?.0;
    (!stem.is_empty()).then(|| stem.to_string())
}

fn expand_url(template: Option<&str>, tag: &str, demo_path: &str) -> String {
    match template {
        Some(template) => template.replace("{tag}", tag).replace("{path}", demo_path),
        None => demo_path.to_string(),
    }
}

fn attach_demo(package: &mut Package, tag: &str, url: String) {
    for module in &mut package.modules {
        for declaration in &mut module.declarations {
            let Declaration::CustomElement(element) = declaration else {
                continue;
            };
            if element.tag_name.as_deref() != Some(tag) {
                continue;
            }
            if element.demos.iter().any(|demo| demo.url == url) {
                continue;
            }
            element.demos.push(Demo {
                url: url.clone(),
                description: None,
            });
            element.demos.sort_by(|a, b| a.url.cmp(&b.url));
        }
    }
}

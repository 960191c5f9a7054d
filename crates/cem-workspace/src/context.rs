//! Filesystem-backed workspace context.
//!
//! Module paths are workspace-relative, forward-slash strings; the context
//! converts them to and from absolute filesystem paths and resolves
//! relative import specifiers between modules.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use walkdir::WalkDir;

use cem_common::{Error, Result};

use crate::config::Config;

/// Directories never worth walking.
const SKIP_DIRS: &[&str] = &["node_modules", ".git"];

/// The `package.json` fields the generator consumes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    pub name: Option<String>,
    /// Declared manifest path, when the package already points at one.
    pub custom_elements: Option<String>,
}

pub struct Workspace {
    root: PathBuf,
    config: Config,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let root: PathBuf = root.into();
        let root = root
            .canonicalize()
            .map_err(|e| Error::file_read("canonicalize workspace root", root.clone(), e))?;
        Ok(Self { root, config })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Expand the configured include globs minus the exclusion globs into a
    /// sorted list of module paths.
    pub fn glob(&self, patterns: &[String]) -> Result<Vec<String>> {
        let include = build_glob_set(patterns)?;
        let exclude = build_glob_set(&self.config.generate.exclude)?;

        let mut matches = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::warn!(%error, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(module_path) = self.fs_path_to_module(entry.path()) else {
                continue;
            };
            if include.is_match(&module_path) && !exclude.is_match(&module_path) {
                matches.push(module_path);
            }
        }
        matches.sort();
        matches.dedup();
        Ok(matches)
    }

    /// Absolute filesystem path for a module path.
    #[must_use]
    pub fn module_path_to_fs(&self, module_path: &str) -> PathBuf {
        let relative = module_path.trim_start_matches("./");
        self.root.join(Path::new(relative))
    }

    /// Workspace-relative, forward-slash module path for a filesystem path.
    /// Returns `None` for paths outside the workspace.
    #[must_use]
    pub fn fs_path_to_module(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()?
        } else {
            path
        };
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(parts.join("/"))
    }

    /// Resolve a relative import specifier from `from_module` to a module
    /// path. Non-relative (bare) specifiers are not resolved.
    #[must_use]
    pub fn resolve_module_dependency(&self, from_module: &str, spec: &str) -> Option<String> {
        if !spec.starts_with("./") && !spec.starts_with("../") {
            return None;
        }
        let dir = match from_module.rfind('/') {
            Some(index) => &from_module[..index],
            None => "",
        };
        let joined = if dir.is_empty() {
            spec.to_string()
        } else {
            format!("{dir}/{spec}")
        };
        normalize_module_path(&joined)
    }

    /// Open (and truncate) a writer for an output path, creating parent
    /// directories as needed. Relative paths are anchored at the root.
    pub fn output_writer(&self, path: &str) -> Result<BufWriter<File>> {
        let path = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.root.join(path)
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::file_read("create output directory", parent, e))?;
        }
        let file =
            File::create(&path).map_err(|e| Error::file_read("create output", path.clone(), e))?;
        Ok(BufWriter::new(file))
    }

    /// Read the workspace `package.json`, when there is one.
    #[must_use]
    pub fn package_json(&self) -> Option<PackageJson> {
        let path = self.root.join("package.json");
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(parsed) => Some(parsed),
            Err(error) => {
                tracing::warn!(%error, path = %path.display(), "unparseable package.json");
                None
            }
        }
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name))
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern.trim_start_matches("./"))
            .map_err(|e| Error::other(format!("invalid glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::other(format!("invalid glob set: {e}")))
}

/// Lexically normalize a forward-slash path: strip `.`, fold `..`.
/// Returns `None` when `..` would escape the workspace root.
#[must_use]
pub fn normalize_module_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            part => parts.push(part),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerateConfig;
    use tempfile::TempDir;

    fn workspace_with(files: &[&str], exclude: &[&str]) -> (TempDir, Workspace) {
        let temp = TempDir::new().unwrap();
        for file in files {
            let path = temp.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "export {};\n").unwrap();
        }
        let config = Config {
            generate: GenerateConfig {
                exclude: exclude.iter().map(|s| s.to_string()).collect(),
                ..GenerateConfig::default()
            },
            ..Config::default()
        };
        let workspace = Workspace::new(temp.path(), config).unwrap();
        (temp, workspace)
    }

    #[test]
    fn glob_is_sorted_and_excludes_apply() {
        let (_temp, workspace) = workspace_with(
            &["src/b.ts", "src/a.ts", "src/a.d.ts", "node_modules/x/y.ts"],
            &["**/*.d.ts"],
        );
        let matched = workspace.glob(&["src/**/*.ts".to_string()]).unwrap();
        assert_eq!(matched, ["src/a.ts", "src/b.ts"]);
    }

    #[test]
    fn path_conversion_roundtrips() {
        let (_temp, workspace) = workspace_with(&["src/el.ts"], &[]);
        let fs_path = workspace.module_path_to_fs("src/el.ts");
        assert!(fs_path.is_absolute());
        assert_eq!(
            workspace.fs_path_to_module(&fs_path).unwrap(),
            "src/el.ts"
        );
    }

    #[test]
    fn relative_specifiers_resolve() {
        let (_temp, workspace) = workspace_with(&["src/el.ts"], &[]);
        assert_eq!(
            workspace
                .resolve_module_dependency("src/el.ts", "./styles.css")
                .unwrap(),
            "src/styles.css"
        );
        assert_eq!(
            workspace
                .resolve_module_dependency("src/nested/el.ts", "../shared.css")
                .unwrap(),
            "src/shared.css"
        );
        assert!(workspace.resolve_module_dependency("src/el.ts", "lit").is_none());
        assert!(
            workspace
                .resolve_module_dependency("el.ts", "../../outside.css")
                .is_none()
        );
    }

    #[test]
    fn package_json_reads_custom_elements_field() {
        let (temp, workspace) = workspace_with(&[], &[]);
        std::fs::write(
            temp.path().join("package.json"),
            r#"{ "name": "widgets", "customElements": "custom-elements.json" }"#,
        )
        .unwrap();
        let package = workspace.package_json().unwrap();
        assert_eq!(
            package.custom_elements.as_deref(),
            Some("custom-elements.json")
        );
    }
}

//! File hashes and the module dependency graph.
//!
//! Three maps under one reader-writer lock: content hashes for change
//! detection, forward edges per module, and the one-hop reverse edge from
//! a CSS file back to the modules consuming it. The reverse edge is what
//! turns "styles.css changed" into "rebuild these modules". The lock is
//! never held across file I/O.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};

use cem_common::{Error, Result};
use cem_workspace::Workspace;

pub type ContentHash = [u8; 32];

/// Forward dependencies of one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleDeps {
    pub style_imports: Vec<String>,
    pub imported_files: Vec<String>,
    pub last_modified: Option<SystemTime>,
}

#[derive(Default)]
struct TrackerState {
    file_hashes: FxHashMap<PathBuf, ContentHash>,
    module_deps: FxHashMap<String, ModuleDeps>,
    css_dep_reverse: FxHashMap<PathBuf, Vec<String>>,
    last_scan_time: Option<SystemTime>,
}

pub struct DependencyTracker {
    state: RwLock<TrackerState>,
}

impl DependencyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(TrackerState::default()),
        }
    }

    /// Record the start of a scan; files whose mtime predates this are
    /// eligible for the hash fast path on the next scan.
    pub fn mark_scan_time(&self) {
        if let Ok(mut state) = self.state.write() {
            state.last_scan_time = Some(SystemTime::now());
        }
    }

    /// Hash a file's content, reusing the stored hash when the mtime says
    /// the file has not been touched since the last scan.
    pub fn update_file_hash(&self, abs_path: &Path) -> Result<ContentHash> {
        let metadata = std::fs::metadata(abs_path)
            .map_err(|e| Error::file_read("stat", abs_path, e))?;
        let modified = metadata.modified().ok();

        {
            let state = self
                .state
                .read()
                .map_err(|_| Error::other("dependency tracker lock poisoned"))?;
            if let (Some(modified), Some(scan), Some(existing)) = (
                modified,
                state.last_scan_time,
                state.file_hashes.get(abs_path),
            ) {
                if modified < scan {
                    return Ok(*existing);
                }
            }
        }

        let bytes =
            std::fs::read(abs_path).map_err(|e| Error::file_read("read", abs_path, e))?;
        let hash: ContentHash = Sha256::digest(&bytes).into();

        let mut state = self
            .state
            .write()
            .map_err(|_| Error::other("dependency tracker lock poisoned"))?;
        state.file_hashes.insert(abs_path.to_path_buf(), hash);
        Ok(hash)
    }

    /// True for files not seen before and files whose content hash moved.
    pub fn has_file_changed(&self, abs_path: &Path) -> bool {
        let previous = self
            .state
            .read()
            .ok()
            .and_then(|state| state.file_hashes.get(abs_path).copied());
        let Some(previous) = previous else {
            return true;
        };
        match std::fs::read(abs_path) {
            Ok(bytes) => ContentHash::from(Sha256::digest(&bytes)) != previous,
            Err(_) => true,
        }
    }

    /// Record a module's forward edges and refresh the CSS reverse edges.
    pub fn record_dependencies(
        &self,
        workspace: &Workspace,
        module_path: &str,
        style_imports: &[String],
        imported_files: &[String],
    ) {
        let resolved_styles: Vec<PathBuf> = style_imports
            .iter()
            .map(|import| workspace.module_path_to_fs(import))
            .collect();

        let Ok(mut state) = self.state.write() else {
            return;
        };
        state.module_deps.insert(
            module_path.to_string(),
            ModuleDeps {
                style_imports: style_imports.to_vec(),
                imported_files: imported_files.to_vec(),
                last_modified: Some(SystemTime::now()),
            },
        );
        for css_path in resolved_styles {
            let consumers = state.css_dep_reverse.entry(css_path).or_default();
            if !consumers.iter().any(|consumer| consumer == module_path) {
                consumers.push(module_path.to_string());
            }
        }
    }

    /// Modules needing a rebuild for the given changed paths: direct
    /// matches plus consumers reached through the CSS reverse edge.
    #[must_use]
    pub fn affected_modules(&self, workspace: &Workspace, changed: &[String]) -> Vec<String> {
        let Ok(state) = self.state.read() else {
            return changed.to_vec();
        };
        let mut affected: FxHashSet<String> = FxHashSet::default();
        for path in changed {
            if state.module_deps.contains_key(path) {
                affected.insert(path.clone());
            } else if path.ends_with(".ts") || path.ends_with(".js") {
                // New module, not tracked yet.
                affected.insert(path.clone());
            }
            let fs_path = workspace.module_path_to_fs(path);
            if let Some(consumers) = state.css_dep_reverse.get(&fs_path) {
                affected.extend(consumers.iter().cloned());
            }
        }
        let mut result: Vec<String> = affected.into_iter().collect();
        result.sort();
        result
    }

    /// Forget a module that no longer exists.
    pub fn remove_module(&self, module_path: &str) {
        let Ok(mut state) = self.state.write() else {
            return;
        };
        state.module_deps.remove(module_path);
        for consumers in state.css_dep_reverse.values_mut() {
            consumers.retain(|consumer| consumer != module_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cem_workspace::Config;
    use tempfile::TempDir;

    fn workspace(temp: &TempDir) -> Workspace {
        Workspace::new(temp.path(), Config::default()).unwrap()
    }

    #[test]
    fn new_files_count_as_changed() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("el.ts");
        std::fs::write(&file, "export {};").unwrap();

        let tracker = DependencyTracker::new();
        assert!(tracker.has_file_changed(&file));

        tracker.update_file_hash(&file).unwrap();
        assert!(!tracker.has_file_changed(&file));

        std::fs::write(&file, "export class A {}").unwrap();
        assert!(tracker.has_file_changed(&file));
    }

    #[test]
    fn hash_is_content_based() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.ts");
        let b = temp.path().join("b.ts");
        std::fs::write(&a, "same").unwrap();
        std::fs::write(&b, "same").unwrap();

        let tracker = DependencyTracker::new();
        assert_eq!(
            tracker.update_file_hash(&a).unwrap(),
            tracker.update_file_hash(&b).unwrap()
        );
    }

    #[test]
    fn css_reverse_edge_finds_consumers() {
        let temp = TempDir::new().unwrap();
        let workspace = workspace(&temp);
        let tracker = DependencyTracker::new();

        tracker.record_dependencies(
            &workspace,
            "src/a.ts",
            &["src/styles.css".to_string()],
            &["src/styles.css".to_string()],
        );
        tracker.record_dependencies(
            &workspace,
            "src/b.ts",
            &["src/styles.css".to_string()],
            &[],
        );
        // Re-recording must not duplicate the reverse edge.
        tracker.record_dependencies(
            &workspace,
            "src/a.ts",
            &["src/styles.css".to_string()],
            &[],
        );

        let affected = tracker.affected_modules(&workspace, &["src/styles.css".to_string()]);
        assert_eq!(affected, ["src/a.ts", "src/b.ts"]);
    }

    #[test]
    fn direct_module_changes_are_affected() {
        let temp = TempDir::new().unwrap();
        let workspace = workspace(&temp);
        let tracker = DependencyTracker::new();
        tracker.record_dependencies(&workspace, "src/a.ts", &[], &[]);

        let affected = tracker.affected_modules(
            &workspace,
            &["src/a.ts".to_string(), "src/new.ts".to_string()],
        );
        assert_eq!(affected, ["src/a.ts", "src/new.ts"]);
    }

    #[test]
    fn removed_modules_drop_their_edges() {
        let temp = TempDir::new().unwrap();
        let workspace = workspace(&temp);
        let tracker = DependencyTracker::new();
        tracker.record_dependencies(
            &workspace,
            "src/a.ts",
            &["src/styles.css".to_string()],
            &[],
        );
        tracker.remove_module("src/a.ts");

        let affected = tracker.affected_modules(&workspace, &["src/styles.css".to_string()]);
        assert!(affected.is_empty());
    }
}

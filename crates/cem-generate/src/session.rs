//! The long-lived generate session.
//!
//! Holds the prepared setup context, the in-memory manifest behind a
//! reader-writer lock, a path-keyed module index for O(1) merges, and the
//! dependency tracker that answers "what needs rebuilding". Full builds
//! and incremental merges share one worker pool: jobs go out over a
//! channel, one collector drains the results.

use std::num::NonZeroUsize;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};

use rustc_hash::FxHashMap;

use cem_common::{CancelToken, Error, ErrorList, Phase, Result};
use cem_schema::{Module, Package};
use cem_workspace::Workspace;

use crate::demos::apply_demo_discovery;
use crate::deps::DependencyTracker;
use crate::processor::{ModuleProcessor, ProcessOutcome};
use crate::setup::SetupContext;
use crate::styles::StyleCache;
use crate::tokens::apply_design_tokens;

/// Fallback input glob when the configuration names none.
const DEFAULT_FILES_GLOB: &str = "**/*.ts";

struct ManifestState {
    manifest: Option<Arc<Package>>,
    module_index: FxHashMap<String, usize>,
}

struct Job {
    module_path: String,
    source: String,
}

pub struct GenerateSession {
    workspace: Arc<Workspace>,
    setup: Arc<SetupContext>,
    style_cache: Arc<StyleCache>,
    tracker: DependencyTracker,
    state: RwLock<ManifestState>,
    worker_count: usize,
}

impl GenerateSession {
    /// Build a session for a workspace. Fails only when the query engine
    /// cannot be brought up.
    pub fn new(workspace: Arc<Workspace>) -> Result<Self> {
        let hardware = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4);
        let worker_count = workspace
            .config()
            .generate
            .workers
            .map_or(hardware, |cap| cap.clamp(1, hardware));
        let setup = Arc::new(SetupContext::new(worker_count)?);
        Ok(Self {
            workspace,
            setup,
            style_cache: Arc::new(StyleCache::new()),
            tracker: DependencyTracker::new(),
            state: RwLock::new(ManifestState {
                manifest: None,
                module_index: FxHashMap::default(),
            }),
            worker_count,
        })
    }

    /// Job parallelism: hardware parallelism capped by configuration.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Enumerate configured files, rebuild every module, replace the
    /// in-memory manifest. Non-fatal extraction errors come back joined.
    pub fn generate_full_manifest(&self, token: &CancelToken) -> Result<ErrorList> {
        let _span = tracing::info_span!("generate_full_manifest").entered();
        token.check()?;
        self.tracker.mark_scan_time();

        let patterns = self.input_patterns();
        let module_paths = self.workspace.glob(&patterns)?;
        tracing::debug!(files = module_paths.len(), "full build starting");

        let (outcomes, mut errors) = self.run_jobs(token, &module_paths)?;
        token.check()?;

        let mut modules = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            self.record_outcome(&outcome, &mut errors);
            modules.push(outcome.module);
        }

        let mut package = Package::new(modules);
        errors.extend(self.enrich(&mut package));

        let mut state = self.write_state()?;
        state.module_index = build_index(&package);
        state.manifest = Some(Arc::new(package));
        Ok(errors)
    }

    /// Rebuild only the modules affected by the changed paths and merge
    /// them into the manifest. Falls back to a full build when no build
    /// has happened yet.
    pub fn process_changed_files(
        &self,
        token: &CancelToken,
        changed_module_paths: &[String],
    ) -> Result<ErrorList> {
        let _span = tracing::info_span!(
            "process_changed_files",
            changed = changed_module_paths.len()
        )
        .entered();
        token.check()?;

        if self.read_state()?.manifest.is_none() {
            tracing::debug!("no manifest yet, degenerating to full build");
            return self.generate_full_manifest(token);
        }

        // Changed stylesheets must re-parse on next use.
        for path in changed_module_paths {
            if path.ends_with(".css") {
                self.style_cache
                    .invalidate(&self.workspace.module_path_to_fs(path));
            }
        }

        let affected = self
            .tracker
            .affected_modules(&self.workspace, changed_module_paths);
        tracing::debug!(affected = affected.len(), "incremental rebuild");

        let mut existing = Vec::new();
        let mut removed = Vec::new();
        for module_path in affected {
            if self.workspace.module_path_to_fs(&module_path).is_file() {
                existing.push(module_path);
            } else {
                removed.push(module_path);
            }
        }

        let (outcomes, mut errors) = self
            .run_jobs(token, &existing)
            .map_err(|e| incremental(e, "process"))?;
        token.check()?;

        for outcome in &outcomes {
            self.record_outcome(outcome, &mut errors);
        }
        for module_path in &removed {
            self.tracker.remove_module(module_path);
        }

        let updated: Vec<Module> = outcomes.into_iter().map(|o| o.module).collect();
        errors.extend(self.merge_modules_into_manifest(updated, &removed)?);
        Ok(errors)
    }

    /// Shallow clone of the manifest: the package is shared, not copied.
    /// `None` before the first build.
    #[must_use]
    pub fn in_memory_manifest(&self) -> Option<Arc<Package>> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.manifest.clone())
    }

    /// Deep clone, safe for external mutation. `None` before the first
    /// build.
    #[must_use]
    pub fn in_memory_manifest_deep(&self) -> Option<Package> {
        self.in_memory_manifest()
            .map(|manifest| (*manifest).clone())
    }

    /// Replace or append the updated modules, drop removed ones, re-sort by
    /// path, rebuild the index, and re-run enrichment before the new
    /// package becomes observable.
    fn merge_modules_into_manifest(
        &self,
        updated_modules: Vec<Module>,
        removed: &[String],
    ) -> Result<ErrorList> {
        let mut state = self.write_state()?;
        let mut modules = state
            .manifest
            .as_ref()
            .map(|m| m.modules.clone())
            .unwrap_or_default();

        for module in updated_modules {
            match state.module_index.get(&module.path) {
                Some(&index) => modules[index] = module,
                None => modules.push(module),
            }
        }
        if !removed.is_empty() {
            modules.retain(|module| !removed.contains(&module.path));
        }

        let mut package = Package::new(modules);
        let errors = self.enrich(&mut package);
        state.module_index = build_index(&package);
        state.manifest = Some(Arc::new(package));
        Ok(errors)
    }

    /// Schedule one processor job per file on the worker pool and collect
    /// the outcomes. Respects cancellation between jobs; in-flight jobs
    /// finish but their results are discarded by the caller's token check.
    fn run_jobs(
        &self,
        token: &CancelToken,
        module_paths: &[String],
    ) -> Result<(Vec<ProcessOutcome>, ErrorList)> {
        let mut errors = ErrorList::new();
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::channel::<ProcessOutcome>();

        let mut outcomes = Vec::with_capacity(module_paths.len());
        std::thread::scope(|scope| {
            for _ in 0..self.worker_count {
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                let token = token.clone();
                scope.spawn(move || {
                    loop {
                        if token.is_cancelled() {
                            break;
                        }
                        let job = { job_rx.lock().map(|rx| rx.recv()) };
                        let Ok(Ok(job)) = job else {
                            break;
                        };
                        let outcome = ModuleProcessor::new(
                            &self.setup,
                            &self.workspace,
                            &self.style_cache,
                            job.module_path,
                            job.source,
                        )
                        .process();
                        if result_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            // Dispatch: read each source and hand it to the pool. A
            // cancelled token stops submission; queued jobs drain when the
            // channel disconnects.
            for module_path in module_paths {
                if token.is_cancelled() {
                    break;
                }
                let abs_path = self.workspace.module_path_to_fs(module_path);
                match std::fs::read_to_string(&abs_path) {
                    Ok(source) => {
                        let job = Job {
                            module_path: module_path.clone(),
                            source,
                        };
                        if job_tx.send(job).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        errors.push(Error::module(
                            module_path,
                            Error::file_read("read source", abs_path, error),
                        ));
                    }
                }
            }
            drop(job_tx);

            // Single collector: merge in arrival order; the final module
            // order comes from the path sort.
            for outcome in result_rx {
                outcomes.push(outcome);
            }
        });

        token.check()?;
        for outcome in &mut outcomes {
            let drained = std::mem::take(&mut outcome.errors);
            for error in drained.0 {
                // Processor errors already carrying module context pass
                // through unchanged.
                let error = match error {
                    already @ Error::Module { .. } => already,
                    other => Error::module(&outcome.module.path, other),
                };
                errors.push(error);
            }
        }
        Ok((outcomes, errors))
    }

    fn record_outcome(&self, outcome: &ProcessOutcome, errors: &mut ErrorList) {
        self.tracker.record_dependencies(
            &self.workspace,
            &outcome.module.path,
            &outcome.style_imports,
            &outcome.imported_files,
        );
        let abs_path = self.workspace.module_path_to_fs(&outcome.module.path);
        if let Err(error) = self.tracker.update_file_hash(&abs_path) {
            errors.push(error);
        }
        for style_import in &outcome.style_imports {
            let css_path = self.workspace.module_path_to_fs(style_import);
            if css_path.is_file() {
                if let Err(error) = self.tracker.update_file_hash(&css_path) {
                    errors.push(error);
                }
            }
        }
    }

    /// Post-passes over the in-memory manifest. Their errors surface but
    /// never drop modules.
    fn enrich(&self, package: &mut Package) -> ErrorList {
        let _span = tracing::info_span!("enrichment").entered();
        let mut errors = apply_design_tokens(&self.workspace, package);
        errors.extend(apply_demo_discovery(&self.workspace, package));

        let mut wrapped = ErrorList::new();
        for error in errors.0 {
            wrapped.push(Error::Phase {
                phase: Phase::Postprocess,
                source: Box::new(error),
            });
        }
        wrapped
    }

    fn input_patterns(&self) -> Vec<String> {
        let configured = &self.workspace.config().generate.files;
        if configured.is_empty() {
            vec![DEFAULT_FILES_GLOB.to_string()]
        } else {
            configured.clone()
        }
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, ManifestState>> {
        self.state
            .read()
            .map_err(|_| Error::other("session state lock poisoned"))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, ManifestState>> {
        self.state
            .write()
            .map_err(|_| Error::other("session state lock poisoned"))
    }
}

fn build_index(package: &Package) -> FxHashMap<String, usize> {
    package
        .modules
        .iter()
        .enumerate()
        .map(|(index, module)| (module.path.clone(), index))
        .collect()
}

fn incremental(error: Error, stage: &str) -> Error {
    match error {
        Error::Cancelled => Error::Cancelled,
        other => Error::Incremental {
            stage: stage.to_string(),
            source: Box::new(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cem_workspace::{Config, GenerateConfig};
    use tempfile::TempDir;

    const ELEMENT: &str = "\
import { LitElement } from 'lit';
import { customElement } from 'lit/decorators.js';

@customElement('my-el')
export class MyEl extends LitElement {}
";

    fn session_for(files: &[(&str, &str)]) -> (TempDir, GenerateSession) {
        let temp = TempDir::new().unwrap();
        for (name, content) in files {
            let path = temp.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
        }
        let config = Config {
            generate: GenerateConfig {
                files: vec!["src/**/*.ts".to_string()],
                ..GenerateConfig::default()
            },
            ..Config::default()
        };
        let workspace = Arc::new(Workspace::new(temp.path(), config).unwrap());
        let session = GenerateSession::new(workspace).unwrap();
        (temp, session)
    }

    fn manifest_json(session: &GenerateSession) -> String {
        session
            .in_memory_manifest()
            .unwrap()
            .to_json_pretty()
            .unwrap()
    }

    #[test]
    fn full_build_is_deterministic() {
        let (_temp, session) = session_for(&[
            ("src/my-el.ts", ELEMENT),
            ("src/other.ts", "export const x = 1;\n"),
        ]);
        let token = CancelToken::new();
        session.generate_full_manifest(&token).unwrap();
        let first = manifest_json(&session);
        session.generate_full_manifest(&token).unwrap();
        let second = manifest_json(&session);
        assert_eq!(first, second);
    }

    #[test]
    fn modules_are_sorted_by_path() {
        let (_temp, session) = session_for(&[
            ("src/z.ts", "export const z = 1;\n"),
            ("src/a.ts", "export const a = 1;\n"),
        ]);
        session.generate_full_manifest(&CancelToken::new()).unwrap();
        let manifest = session.in_memory_manifest().unwrap();
        let paths: Vec<&str> = manifest.modules.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, ["src/a.ts", "src/z.ts"]);
    }

    #[test]
    fn no_manifest_before_first_build() {
        let (_temp, session) = session_for(&[("src/a.ts", "export const a = 1;\n")]);
        assert!(session.in_memory_manifest().is_none());
        assert!(session.in_memory_manifest_deep().is_none());
    }

    #[test]
    fn cancelled_token_aborts_and_preserves_manifest() {
        let (_temp, session) = session_for(&[("src/my-el.ts", ELEMENT)]);
        let token = CancelToken::new();
        token.cancel();
        let result = session.generate_full_manifest(&token);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(session.in_memory_manifest().is_none());
    }

    #[test]
    fn incremental_matches_full_rebuild() {
        let files = [
            ("src/my-el.ts", ELEMENT),
            ("src/util.ts", "export const VERSION = '1';\n"),
        ];
        let (temp, session) = session_for(&files);
        let token = CancelToken::new();
        session.generate_full_manifest(&token).unwrap();

        // Edit one module, rebuild incrementally.
        let updated = "export const VERSION = '2';\n";
        std::fs::write(temp.path().join("src/util.ts"), updated).unwrap();
        session
            .process_changed_files(&token, &["src/util.ts".to_string()])
            .unwrap();
        let incremental = manifest_json(&session);

        // A fresh session over the same tree must agree bit-for-bit.
        let config = Config {
            generate: GenerateConfig {
                files: vec!["src/**/*.ts".to_string()],
                ..GenerateConfig::default()
            },
            ..Config::default()
        };
        let workspace = Arc::new(Workspace::new(temp.path(), config).unwrap());
        let fresh = GenerateSession::new(workspace).unwrap();
        fresh.generate_full_manifest(&token).unwrap();
        assert_eq!(incremental, manifest_json(&fresh));
    }

    #[test]
    fn changed_css_rebuilds_consumers_through_reverse_edge() {
        let element = "\
import styles from './styles.css';
import { LitElement } from 'lit';

export class AEl extends LitElement {
  static styles = styles;
}
customElements.define('a-el', AEl);
";
        let files = [
            ("src/a-el.ts", element),
            ("src/styles.css", ":host { --foo: red; }"),
        ];
        let (temp, session) = session_for(&files);
        let token = CancelToken::new();
        session.generate_full_manifest(&token).unwrap();

        std::fs::write(
            temp.path().join("src/styles.css"),
            ":host { --foo: blue; }",
        )
        .unwrap();
        session
            .process_changed_files(&token, &["src/styles.css".to_string()])
            .unwrap();

        let manifest = session.in_memory_manifest().unwrap();
        let module = &manifest.modules[0];
        let decl = module
            .declarations
            .iter()
            .find_map(cem_schema::Declaration::as_custom_element)
            .unwrap();
        assert_eq!(decl.css_properties[0].default.as_deref(), Some("blue"));
    }

    #[test]
    fn incremental_before_any_build_degenerates_to_full() {
        let (_temp, session) = session_for(&[("src/my-el.ts", ELEMENT)]);
        session
            .process_changed_files(&CancelToken::new(), &["src/my-el.ts".to_string()])
            .unwrap();
        assert_eq!(session.in_memory_manifest().unwrap().modules.len(), 1);
    }

    #[test]
    fn deleted_files_leave_the_manifest() {
        let files = [
            ("src/my-el.ts", ELEMENT),
            ("src/gone.ts", "export const g = 1;\n"),
        ];
        let (temp, session) = session_for(&files);
        let token = CancelToken::new();
        session.generate_full_manifest(&token).unwrap();
        assert_eq!(session.in_memory_manifest().unwrap().modules.len(), 2);

        std::fs::remove_file(temp.path().join("src/gone.ts")).unwrap();
        session
            .process_changed_files(&token, &["src/gone.ts".to_string()])
            .unwrap();
        let manifest = session.in_memory_manifest().unwrap();
        assert_eq!(manifest.modules.len(), 1);
        assert_eq!(manifest.modules[0].path, "src/my-el.ts");
    }

    #[test]
    fn deep_clone_is_detached_from_the_session() {
        let (_temp, session) = session_for(&[("src/my-el.ts", ELEMENT)]);
        session.generate_full_manifest(&CancelToken::new()).unwrap();

        let mut deep = session.in_memory_manifest_deep().unwrap();
        deep.modules.clear();
        assert_eq!(session.in_memory_manifest().unwrap().modules.len(), 1);
    }

    #[test]
    fn concurrent_reads_never_see_a_partial_package() {
        let (_temp, session) = session_for(&[
            ("src/my-el.ts", ELEMENT),
            ("src/util.ts", "export const V = 1;\n"),
        ]);
        let session = Arc::new(session);
        let token = CancelToken::new();
        session.generate_full_manifest(&token).unwrap();

        std::thread::scope(|scope| {
            let reader = {
                let session = Arc::clone(&session);
                scope.spawn(move || {
                    for _ in 0..50 {
                        if let Some(manifest) = session.in_memory_manifest() {
                            // A merged package always has the full sorted set.
                            assert_eq!(manifest.modules.len(), 2);
                            assert!(manifest.modules[0].path <= manifest.modules[1].path);
                        }
                    }
                })
            };
            let writer = {
                let session = Arc::clone(&session);
                let token = token.clone();
                scope.spawn(move || {
                    for _ in 0..3 {
                        session.generate_full_manifest(&token).unwrap();
                    }
                })
            };
            reader.join().unwrap();
            writer.join().unwrap();
        });
    }
}

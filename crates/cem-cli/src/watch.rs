//! Watch mode: filesystem events to incremental rebuilds.
//!
//! Events flow through a fixed pipeline: operation filter, input-glob
//! filter, self-write filter, then a 100 ms debounce. When the debounce
//! window closes, any in-flight generation is cancelled, the pending set
//! snapshots, and an incremental pass runs on a background thread. The
//! session's own mutexes are held only to mutate the pending set, the
//! cancellation handle, or the self-write ledger, never across
//! generation.
//!
//! Writing the manifest into a watched directory would otherwise loop
//! forever; the self-write ledger records `{sha256, modtime}` of every
//! write and drops matching events.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, RecursiveMode, Watcher, event::ModifyKind};
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};

use cem_common::CancelToken;
use cem_generate::GenerateSession;
use cem_workspace::Workspace;

use crate::driver::write_manifest;

const DEBOUNCE_DELAY: Duration = Duration::from_millis(100);

/// Modtimes this close to a recorded self-write count as the same write.
const SELF_WRITE_TOLERANCE: Duration = Duration::from_secs(1);

/// Collects changed paths and decides when the batch is ready.
pub struct Debouncer {
    delay: Duration,
    pending: FxHashSet<String>,
    deadline: Option<Instant>,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: FxHashSet::default(),
            deadline: None,
        }
    }

    /// Record a change; every event restarts the timer.
    pub fn record_at(&mut self, now: Instant, module_path: String) {
        self.pending.insert(module_path);
        self.deadline = Some(now + self.delay);
    }

    /// Snapshot and clear the pending set once the window has closed.
    pub fn flush_ready(&mut self, now: Instant) -> Option<Vec<String>> {
        let deadline = self.deadline?;
        if now < deadline || self.pending.is_empty() {
            return None;
        }
        self.deadline = None;
        let mut batch: Vec<String> = self.pending.drain().collect();
        batch.sort();
        Some(batch)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Decides whether an event's path belongs to the watched inputs.
pub struct WatchFilter {
    include: GlobSet,
}

impl WatchFilter {
    /// Inputs are the configured generate globs plus the demo glob when
    /// demo discovery is on. Stylesheets always pass: their consumers are
    /// found through the reverse dependency edge.
    pub fn new(workspace: &Workspace) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let config = workspace.config();
        for pattern in &config.generate.files {
            builder.add(Glob::new(pattern.trim_start_matches("./"))?);
        }
        if let Some(demos) = &config.generate.demo_discovery {
            if !demos.file_glob.is_empty() {
                builder.add(Glob::new(demos.file_glob.trim_start_matches("./"))?);
            }
        }
        Ok(Self {
            include: builder.build()?,
        })
    }

    /// The module path to record, or `None` to drop the event.
    #[must_use]
    pub fn should_record(&self, workspace: &Workspace, path: &Path) -> Option<String> {
        let module_path = workspace.fs_path_to_module(path)?;
        if module_path.ends_with(".css") {
            return Some(module_path);
        }
        self.include.is_match(&module_path).then_some(module_path)
    }
}

struct WrittenOutput {
    hash: [u8; 32],
    mod_time: Option<SystemTime>,
}

/// Maps output paths to the hash and modtime of our last write there.
pub struct SelfWriteLedger {
    entries: FxHashMap<PathBuf, WrittenOutput>,
}

impl SelfWriteLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Record a manifest write under the cleaned output path.
    pub fn record(&mut self, path: &Path, content: &[u8]) {
        let mod_time = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        self.entries.insert(
            clean_path(path),
            WrittenOutput {
                hash: Sha256::digest(content).into(),
                mod_time,
            },
        );
    }

    /// Prime the ledger from a file already on disk (the initial build's
    /// output, written before the watcher started).
    pub fn record_existing(&mut self, path: &Path) {
        if let Ok(content) = std::fs::read(path) {
            self.record(path, &content);
        }
    }

    /// True when an event for `path` is the echo of our own write: the
    /// modtime matches the recorded one within a 1 s tolerance. A
    /// definitively later modtime is a real external change. When the
    /// modtime is inconclusive, the content hash decides.
    #[must_use]
    pub fn is_self_write(&self, path: &Path) -> bool {
        let Some(entry) = self.entries.get(&clean_path(path)) else {
            return false;
        };
        let observed = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        if let (Some(observed), Some(recorded)) = (observed, entry.mod_time) {
            let delta = observed
                .duration_since(recorded)
                .unwrap_or_else(|e| e.duration());
            if delta <= SELF_WRITE_TOLERANCE {
                return true;
            }
            if observed > recorded {
                return false;
            }
        }
        match std::fs::read(path) {
            Ok(content) => <[u8; 32]>::from(Sha256::digest(&content)) == entry.hash,
            Err(_) => false,
        }
    }
}

fn clean_path(path: &Path) -> PathBuf {
    path.components().collect()
}

pub struct WatchSession {
    session: Arc<GenerateSession>,
    filter: WatchFilter,
    ledger: Arc<Mutex<SelfWriteLedger>>,
    inflight: Arc<Mutex<Option<CancelToken>>>,
    output: Option<String>,
}

impl WatchSession {
    pub fn new(session: Arc<GenerateSession>, output: Option<String>) -> Result<Self> {
        let filter = WatchFilter::new(session.workspace())?;

        let mut ledger = SelfWriteLedger::new();
        if let Some(output) = &output {
            // The initial full build already wrote here.
            let path = resolve_output(session.workspace(), output);
            ledger.record_existing(&path);
        }

        Ok(Self {
            session,
            filter,
            ledger: Arc::new(Mutex::new(ledger)),
            inflight: Arc::new(Mutex::new(None)),
            output,
        })
    }

    /// Run the watch loop until the watcher channel closes. Transient
    /// watcher errors are logged; generation errors never end the loop.
    pub fn run(&self) -> Result<()> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |result| {
            let _ = tx.send(result);
        })
        .context("cannot create filesystem watcher")?;
        let root = self.session.workspace().root().to_path_buf();
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("cannot watch {}", root.display()))?;
        tracing::info!(root = %root.display(), "watching for changes");

        let mut debouncer = Debouncer::new(DEBOUNCE_DELAY);
        loop {
            let timeout = debouncer
                .next_deadline()
                .map_or(Duration::from_millis(500), |deadline| {
                    deadline.saturating_duration_since(Instant::now())
                });
            match rx.recv_timeout(timeout) {
                Ok(Ok(event)) => self.handle_event(&event, &mut debouncer),
                Ok(Err(error)) => tracing::warn!(%error, "watcher error"),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if let Some(batch) = debouncer.flush_ready(Instant::now()) {
                self.start_generation(batch);
            }
        }
        Ok(())
    }

    fn handle_event(&self, event: &Event, debouncer: &mut Debouncer) {
        if !is_create_or_write(&event.kind) {
            return;
        }
        for path in &event.paths {
            let Some(module_path) = self.filter.should_record(self.session.workspace(), path)
            else {
                continue;
            };
            let is_own_output = self
                .ledger
                .lock()
                .map(|ledger| ledger.is_self_write(path))
                .unwrap_or(false);
            if is_own_output {
                tracing::debug!(path = %module_path, "ignoring self-write");
                continue;
            }
            tracing::debug!(path = %module_path, "change recorded");
            debouncer.record_at(Instant::now(), module_path);
        }
    }

    /// Cancel any in-flight generation and start a fresh one for the
    /// batch on a background thread.
    fn start_generation(&self, changed: Vec<String>) {
        let token = CancelToken::new();
        {
            let Ok(mut inflight) = self.inflight.lock() else {
                return;
            };
            if let Some(previous) = inflight.take() {
                previous.cancel();
            }
            *inflight = Some(token.clone());
        }

        let session = Arc::clone(&self.session);
        let ledger = Arc::clone(&self.ledger);
        let output = self.output.clone();
        std::thread::spawn(move || {
            tracing::info!(changed = changed.len(), "regenerating");
            match session.process_changed_files(&token, &changed) {
                Ok(errors) => {
                    for error in errors.iter() {
                        tracing::warn!(%error, "generation");
                    }
                }
                Err(error) if error.is_cancelled() => {
                    tracing::warn!("generation cancelled by a newer change");
                    return;
                }
                Err(error) => {
                    tracing::error!(%error, "generation failed");
                    return;
                }
            }
            if token.is_cancelled() {
                return;
            }
            let Some(output) = output else {
                return;
            };
            let Some(manifest) = session.in_memory_manifest() else {
                return;
            };
            match write_manifest(session.workspace(), &output, &manifest) {
                Ok(content) => {
                    let path = resolve_output(session.workspace(), &output);
                    if let Ok(mut ledger) = ledger.lock() {
                        ledger.record(&path, &content);
                    }
                    tracing::info!(%output, "manifest written");
                }
                Err(error) => tracing::error!(%error, "manifest write failed"),
            }
        });
    }
}

fn resolve_output(workspace: &Workspace, output: &str) -> PathBuf {
    let path = Path::new(output);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.root().join(path)
    }
}

/// Only creations and content writes feed the debounce.
fn is_create_or_write(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(modify) => !matches!(modify, ModifyKind::Metadata(_)),
        _ => false,
    }
}

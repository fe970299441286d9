//! Debouncing filesystem watcher.
//!
//! A notify watcher feeds raw changes to a dedicated debounce thread, which
//! coalesces bursts per path while retaining the highest-priority change
//! kind seen. Settled changes cross into the async side over a bounded
//! handoff channel with a send timeout: when the consumer cannot keep up,
//! the event is logged and dropped rather than blocking the observer side
//! or buffering without bound.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use thiserror::Error;

use super::types::{ChangeKind, RawChange};

/// How long the debounce thread will wait for the async side to accept a
/// settled change before dropping it.
const HANDOFF_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the debounce-to-scheduler handoff channel.
const HANDOFF_CAPACITY: usize = 64;

/// Poll interval while no changes are pending.
const IDLE_POLL: Duration = Duration::from_millis(500);

/// Editor droppings and hidden files that never become content events.
const TEMP_FILE_SUFFIXES: &[&str] = &[".swp", ".swo", ".swn", ".tmp", ".temp", "~", ".4913"];

/// Errors from watcher startup.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watch path does not exist: {path}")]
    PathMissing { path: PathBuf },

    #[error("watch path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("failed to initialize watcher: {0}")]
    Init(#[from] notify::Error),

    #[error("failed to spawn debounce thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Whether a file name belongs to a temp/swap/hidden file.
pub fn is_temp_file(name: &str) -> bool {
    name.starts_with('.')
        || name == "4913"
        || TEMP_FILE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Reduce a notify event kind to a content change kind.
///
/// Directory create/remove, renames, and access events carry no content
/// change and are filtered here.
fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(CreateKind::Folder) => None,
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(RemoveKind::Folder) => None,
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Recursive directory watcher with per-path debouncing.
///
/// `start` returns the watcher handle and the receiving end of the handoff
/// channel; consume it with `recv_async` from the runtime.
pub struct ContentWatcher {
    paths: Vec<PathBuf>,
    watcher: Option<notify::RecommendedWatcher>,
    debounce_thread: Option<JoinHandle<()>>,
    coalesced: Arc<AtomicU64>,
}

impl ContentWatcher {
    /// Validate the watch paths and start monitoring.
    ///
    /// Fails fast when a path is missing or not a directory; this is a
    /// startup error the embedding application must surface.
    pub fn start(
        paths: Vec<PathBuf>,
        debounce_ms: u64,
    ) -> Result<(Self, flume::Receiver<RawChange>), WatchError> {
        for path in &paths {
            if !path.exists() {
                return Err(WatchError::PathMissing { path: path.clone() });
            }
            if !path.is_dir() {
                return Err(WatchError::NotADirectory { path: path.clone() });
            }
        }

        let (raw_tx, raw_rx) = crossbeam_channel::unbounded::<RawChange>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let Some(kind) = change_kind(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
                        else {
                            continue;
                        };
                        if is_temp_file(&name) {
                            continue;
                        }
                        // Receiver disconnect means shutdown; nothing to do.
                        let _ = raw_tx.send(RawChange { path, kind });
                    }
                }
                Err(e) => {
                    tracing::error!("[watcher] file watch error: {e}");
                }
            }
        })?;

        for path in &paths {
            watcher.watch(path, RecursiveMode::Recursive)?;
            crate::debug_event!("watcher", "watching", "{}", path.display());
        }

        let (handoff_tx, handoff_rx) = flume::bounded(HANDOFF_CAPACITY);
        let window = Duration::from_millis(debounce_ms);
        let coalesced = Arc::new(AtomicU64::new(0));

        let debounce_thread = std::thread::Builder::new()
            .name("mirador-debounce".to_string())
            .spawn({
                let coalesced = coalesced.clone();
                move || debounce_loop(raw_rx, handoff_tx, window, coalesced)
            })?;

        crate::log_event!(
            "watcher",
            "started",
            "{} paths, {debounce_ms}ms debounce",
            paths.len()
        );

        Ok((
            Self {
                paths,
                watcher: Some(watcher),
                debounce_thread: Some(debounce_thread),
                coalesced,
            },
            handoff_rx,
        ))
    }

    /// Directories being watched.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Number of raw events coalesced into an already-pending change.
    pub fn coalesced_events(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    /// Stop monitoring. Pending debounce state is discarded without
    /// flushing; coalesced changes still in flight are lost.
    pub fn stop(&mut self) {
        // Dropping the notify watcher drops its callback and with it the raw
        // sender; the debounce thread observes the disconnect and exits.
        if self.watcher.take().is_none() {
            return;
        }
        if let Some(handle) = self.debounce_thread.take() {
            let _ = handle.join();
        }
        crate::log_event!("watcher", "stopped");
    }
}

impl Drop for ContentWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Pending {
    kind: ChangeKind,
    deadline: Instant,
}

/// Debounce thread body: coalesce raw changes per path, flush settled ones
/// across the handoff channel.
fn debounce_loop(
    raw_rx: crossbeam_channel::Receiver<RawChange>,
    handoff_tx: flume::Sender<RawChange>,
    window: Duration,
    coalesced: Arc<AtomicU64>,
) {
    let mut pending: HashMap<PathBuf, Pending> = HashMap::new();

    loop {
        let timeout = pending
            .values()
            .map(|p| p.deadline)
            .min()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL);

        match raw_rx.recv_timeout(timeout) {
            Ok(change) => {
                let deadline = Instant::now() + window;
                match pending.entry(change.path) {
                    Entry::Occupied(mut entry) => {
                        let p = entry.get_mut();
                        // Keep the higher-priority kind, restart the timer.
                        if change.kind.priority() > p.kind.priority() {
                            p.kind = change.kind;
                        }
                        p.deadline = deadline;
                        coalesced.fetch_add(1, Ordering::Relaxed);
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(Pending {
                            kind: change.kind,
                            deadline,
                        });
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // Shutdown: pending entries die unflushed, by design.
            Err(RecvTimeoutError::Disconnected) => return,
        }

        let now = Instant::now();
        let due: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        for path in due {
            let Some(p) = pending.remove(&path) else {
                continue;
            };
            crate::debug_event!("watcher", "settled", "{:?} {}", p.kind, path.display());
            match handoff_tx.send_timeout(RawChange { path, kind: p.kind }, HANDOFF_TIMEOUT) {
                Ok(()) => {}
                Err(flume::SendTimeoutError::Timeout(change)) => {
                    tracing::warn!(
                        path = %change.path.display(),
                        "handoff timed out, event dropped"
                    );
                }
                Err(flume::SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}

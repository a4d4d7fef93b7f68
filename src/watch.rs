// ============================================================================
// hmr-runner - Filesystem watcher adapter
//
// A dedicated OS thread hosts the blocking `notify` watcher (recommended
// backend per platform) and forwards raw events into an async task over a
// std mpsc channel. That task debounces: it waits up to `debounce_ms` after
// the first event of a burst, then keeps draining for up to `step_ms` after
// each subsequent event before cutting a batch, coalescing duplicate paths
// into a set exactly like the upstream daemon's watchfiles-backed loop.
// ============================================================================

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::HmrError;

/// A coalesced set of paths observed during one debounce window.
#[derive(Debug, Clone, Default)]
pub struct PathEventBatch {
    pub paths: HashSet<PathBuf>,
}

impl PathEventBatch {
    fn merge(&mut self, other: PathEventBatch) {
        self.paths.extend(other.paths);
    }
}

pub struct WatchConfig {
    pub roots: Vec<PathBuf>,
    pub debounce_ms: u64,
    pub step_ms: u64,
}

impl WatchConfig {
    /// Debounce/step from explicit config, falling back to the daemon's
    /// environment-variable knobs, falling back to fixed defaults.
    pub fn with_env_defaults(roots: Vec<PathBuf>, debounce_ms: Option<u64>, step_ms: Option<u64>) -> Self {
        let debounce_ms = debounce_ms
            .or_else(|| env_u64("HMR_RUNNER_WATCH_DEBOUNCE_MS"))
            .unwrap_or(300);
        let step_ms = step_ms.or_else(|| env_u64("HMR_RUNNER_WATCH_STEP_MS")).unwrap_or(50);
        Self { roots, debounce_ms, step_ms }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// A running watcher. Dropping it stops the background thread and task.
pub struct PathWatcher {
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
    stop_tx: std_mpsc::Sender<()>,
}

impl PathWatcher {
    /// Start watching `config.roots` recursively, returning the watcher
    /// handle and a receiver of debounced, coalesced path batches.
    pub fn start(config: WatchConfig) -> Result<(Self, mpsc::UnboundedReceiver<PathEventBatch>), HmrError> {
        let (raw_tx, raw_rx) = std_mpsc::channel::<Event>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        })
        .map_err(|e| HmrError::Watcher(e.to_string()))?;

        for root in &config.roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| HmrError::Watcher(format!("failed to watch {}: {e}", root.display())))?;
        }

        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let debounce_ms = config.debounce_ms;
        let step_ms = config.step_ms;

        // The blocking receive side of the std channel runs on a dedicated
        // thread; it forwards individual paths into a tokio channel that the
        // async debounce loop below reads from.
        let (path_tx, mut path_rx) = mpsc::unbounded_channel::<PathBuf>();
        thread::spawn(move || {
            loop {
                if stop_rx.try_recv().is_ok() {
                    return;
                }
                match raw_rx.recv_timeout(Duration::from_millis(200)) {
                    Ok(event) => {
                        if !is_relevant(&event.kind) {
                            continue;
                        }
                        for path in event.paths {
                            if path_tx.send(path).is_err() {
                                return;
                            }
                        }
                    }
                    Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(std_mpsc::RecvTimeoutError::Disconnected) => return,
                }
            }
        });

        let task = tokio::spawn(async move {
            loop {
                let Some(first) = path_rx.recv().await else { return };
                let mut batch = PathEventBatch::default();
                batch.paths.insert(first);

                tokio::time::sleep(Duration::from_millis(debounce_ms)).await;
                loop {
                    match tokio::time::timeout(Duration::from_millis(step_ms), path_rx.recv()).await {
                        Ok(Some(path)) => {
                            batch.paths.insert(path);
                        }
                        Ok(None) => {
                            let _ = batch_tx.send(batch);
                            return;
                        }
                        Err(_) => break,
                    }
                }

                if batch_tx.send(batch).is_err() {
                    return;
                }
            }
        });

        Ok((Self { _watcher: watcher, task, stop_tx }, batch_rx))
    }

    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        self.task.abort();
        let _ = self.task.await;
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// True if `path` lies within an extra-watch root or a tracked file's
/// directory, used by the reload coordinator to decide whether a batch's
/// paths are relevant at all before classifying them further.
pub fn path_is_under(path: &Path, roots: &[PathBuf]) -> bool {
    roots.iter().any(|root| path.starts_with(root))
}

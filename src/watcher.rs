//! Debounced filesystem-change source feeding the Ingestor (`spec.md §4.7`).
//!
//! `notify-debouncer-full` collapses bursts of fs events into one batch per
//! `debounce_ms` window; this module classifies and deduplicates that batch
//! by path, then spawns one `Ingestor::reingest_path`/`delete_path` call per
//! unique path onto the calling `tokio::runtime::Handle`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer, FileIdMap};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ingestor::{IndexEvent, Ingestor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    CreateOrModify,
    Remove,
}

fn classify(event: &DebouncedEvent) -> Option<ChangeKind> {
    use notify::EventKind;
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => Some(ChangeKind::CreateOrModify),
        EventKind::Remove(_) => Some(ChangeKind::Remove),
        _ => None,
    }
}

/// Owns the live `notify-debouncer-full` handle; dropping a [`Watcher`]
/// stops watching (the debouncer's `Drop` tears down the OS watch).
pub struct Watcher {
    _debouncer: Debouncer<notify::RecommendedWatcher, FileIdMap>,
    root: PathBuf,
}

impl Watcher {
    /// Starts watching `root` recursively. `ignored` is a list of
    /// workspace-relative directory/file name components to drop from every
    /// debounced batch before it reaches the Ingestor (`spec.md §6`'s
    /// `watch.ignored`).
    pub fn start(
        root: PathBuf,
        ingestor: Arc<Ingestor>,
        debounce_ms: u64,
        ignored: Vec<String>,
        events: Option<broadcast::Sender<IndexEvent>>,
    ) -> Result<Self> {
        let watch_root = root.clone();
        let rt_handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(anyhow::anyhow!("watcher requires a tokio runtime: {e}")))?;

        let mut debouncer = new_debouncer(Duration::from_millis(debounce_ms.max(1)), None, {
            let watch_root = watch_root.clone();
            move |result: DebounceEventResult| match result {
                Ok(debounced_events) => {
                    handle_batch(&watch_root, &ignored, &debounced_events, &ingestor, &rt_handle, &events);
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "file watcher error");
                    }
                }
            }
        })
        .map_err(|e| Error::Internal(anyhow::anyhow!("failed to start watcher: {e}")))?;

        debouncer
            .watch(watch_root.as_path(), RecursiveMode::Recursive)
            .map_err(|e| Error::Internal(anyhow::anyhow!("failed to watch {}: {e}", watch_root.display())))?;

        info!(root = %root.display(), debounce_ms, "watcher started");
        Ok(Self { _debouncer: debouncer, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn handle_batch(
    root: &Path,
    ignored: &[String],
    debounced_events: &[DebouncedEvent],
    ingestor: &Arc<Ingestor>,
    rt_handle: &tokio::runtime::Handle,
    events: &Option<broadcast::Sender<IndexEvent>>,
) {
    // Last event wins per path — a rapid create-then-modify-then-save cycle
    // collapses to a single re-ingest, matching `spec.md §4.7`'s "extra
    // write-stability window" intent without needing a second timer.
    let mut by_path: HashMap<PathBuf, ChangeKind> = HashMap::new();
    for event in debounced_events {
        let Some(kind) = classify(event) else { continue };
        for path in &event.paths {
            if is_ignored(path, root, ignored) {
                continue;
            }
            by_path.insert(path.clone(), kind);
        }
    }

    for (absolute, kind) in by_path {
        let relative = match absolute.strip_prefix(root) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };

        let ingestor = ingestor.clone();
        let events = events.clone();
        rt_handle.spawn(async move {
            let result = match kind {
                ChangeKind::CreateOrModify => ingestor.reingest_path(&relative).await,
                ChangeKind::Remove => ingestor.delete_path(&relative),
            };
            if let Err(e) = result {
                debug!(file = %relative, error = %e, "watcher-triggered reingest failed");
                if let Some(tx) = &events {
                    let _ = tx.send(IndexEvent::FileError { file_path: relative, message: e.to_string() });
                }
            }
        });
    }
}

fn is_ignored(path: &Path, root: &Path, ignored: &[String]) -> bool {
    use crate::config::DEFAULT_EXCLUDE_DIRS;
    let Ok(rel) = path.strip_prefix(root) else { return false };
    for component in rel.components() {
        let name = component.as_os_str().to_string_lossy();
        if DEFAULT_EXCLUDE_DIRS.contains(&name.as_ref()) || ignored.iter().any(|p| p == name.as_ref()) {
            return true;
        }
    }
    false
}

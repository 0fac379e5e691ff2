//! Debounced filesystem watching with startup reconciliation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use tokio::sync::mpsc;

use retrievio_core::{FileEvent, FileEventKind};

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce window for coalescing bursts on the same path (default: 300ms).
    pub debounce_ms: u64,
    /// Bounded event queue size; a full queue blocks emission rather than
    /// dropping events (default: 256).
    pub queue_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            queue_capacity: 256,
        }
    }
}

/// Whether this path should flow through the pipeline.
#[must_use]
pub fn is_indexable(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|s| s.eq_ignore_ascii_case(ext)))
}

/// Diff the registry's last-known file set against the current directory
/// listing, producing the events missed while the process was down.
///
/// Files on disk but unknown become `Created`; known files still on disk
/// become `Modified` (the pipeline's content-hash check makes unchanged
/// ones a no-op); known files that are gone become `Deleted`. A known path
/// that errors for any reason other than not-found becomes `Unreadable`.
#[must_use]
pub fn reconcile(root: &Path, known: &[PathBuf], extensions: &[String]) -> Vec<FileEvent> {
    let mut on_disk: HashSet<PathBuf> = HashSet::new();
    for entry in ignore::WalkBuilder::new(root).hidden(true).build() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_some_and(|ft| ft.is_file())
                    && is_indexable(entry.path(), extensions)
                {
                    on_disk.insert(entry.path().to_path_buf());
                }
            }
            Err(e) => tracing::warn!("reconcile walk error: {e}"),
        }
    }

    let known_set: HashSet<&PathBuf> = known.iter().collect();
    let mut events = Vec::new();

    for path in &on_disk {
        let kind = if known_set.contains(path) {
            FileEventKind::Modified
        } else {
            FileEventKind::Created
        };
        events.push(FileEvent::new(path.clone(), kind));
    }

    for path in known {
        if on_disk.contains(path) {
            continue;
        }
        let kind = match std::fs::metadata(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileEventKind::Deleted,
            Err(_) => FileEventKind::Unreadable,
            // Present but no longer indexable (renamed extension etc.).
            Ok(_) => FileEventKind::Deleted,
        };
        events.push(FileEvent::new(path.clone(), kind));
    }

    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}

/// Filesystem watcher emitting debounced, deduplicated [`FileEvent`]s.
///
/// The stream is lazy and effectively infinite; dropping the watcher or
/// the receiver ends it. Watcher errors are logged per callback, never
/// fatal to the stream.
pub struct ChangeWatcher {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}

impl ChangeWatcher {
    /// Start watching `root` recursively.
    ///
    /// `seed` is the set of paths already known to exist (from
    /// reconciliation), used to classify subsequent events as created vs
    /// modified.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized.
    pub fn subscribe(
        root: &Path,
        config: &WatcherConfig,
        extensions: Vec<String>,
        seed: HashSet<PathBuf>,
    ) -> Result<(Self, mpsc::Receiver<FileEvent>), notify::Error> {
        let (tx, rx) = mpsc::channel::<FileEvent>(config.queue_capacity.max(1));
        let mut seen = seed;

        let mut debouncer = new_debouncer(
            Duration::from_millis(config.debounce_ms),
            move |events: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("watcher error: {e}");
                        return;
                    }
                };

                let paths: HashSet<PathBuf> = events
                    .into_iter()
                    .filter(|e| {
                        e.kind == DebouncedEventKind::Any && is_indexable(&e.path, &extensions)
                    })
                    .map(|e| e.path)
                    .collect();

                for path in paths {
                    let kind = if path.exists() {
                        if seen.insert(path.clone()) {
                            FileEventKind::Created
                        } else {
                            FileEventKind::Modified
                        }
                    } else if seen.remove(&path) {
                        FileEventKind::Deleted
                    } else {
                        continue;
                    };

                    // Backpressure: block the watcher thread when the
                    // queue is full instead of dropping the event.
                    if tx.blocking_send(FileEvent::new(path, kind)).is_err() {
                        return;
                    }
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(root, notify::RecursiveMode::Recursive)?;

        Ok((
            Self {
                _debouncer: debouncer,
            },
            rx,
        ))
    }
}

//! Desktop change-notification service backed by `notify`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::service::{ChangeEvent, ChangeNotificationService, EventSink, RegistrationId};
use super::ObserveError;
use crate::path::FilePath;

/// [`ChangeNotificationService`] using the platform's recommended `notify` backend.
///
/// Each registration owns its own `notify::RecommendedWatcher`, so stopping
/// one observer never affects another. Platforms without file versions
/// never report the version or conflict events.
pub struct NotifyChangeService {
    /// Watch directory subtrees rather than only direct entries.
    recursive: bool,
    next_id: AtomicU64,
    /// Live watchers, dropped (and thereby stopped) on unregister.
    watchers: Mutex<HashMap<RegistrationId, notify::RecommendedWatcher>>,
}

impl NotifyChangeService {
    pub fn new(recursive: bool) -> Self {
        Self {
            recursive,
            next_id: AtomicU64::new(0),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live registrations.
    pub fn registration_count(&self) -> usize {
        self.watchers.lock().len()
    }
}

impl Default for NotifyChangeService {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ChangeNotificationService for NotifyChangeService {
    fn name(&self) -> &str {
        "notify"
    }

    fn register(&self, path: &FilePath, sink: EventSink) -> Result<RegistrationId, ObserveError> {
        let root = path.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in translate(&root, &event) {
                    if !sink.send(change) {
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("[observer] file watch error for {root}: {e}");
            }
        })
        .map_err(|e| ObserveError::registration(path, e))?;

        let mode = if self.recursive && path.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(path.as_path(), mode)
            .map_err(|e| ObserveError::registration(path, e))?;

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.watchers.lock().insert(id, watcher);
        crate::debug_event!("observer", "watching", "{path} {mode:?} {id}");
        Ok(id)
    }

    fn unregister(&self, id: RegistrationId) {
        // Drop outside the lock; notify joins its worker thread on drop.
        let watcher = self.watchers.lock().remove(&id);
        if watcher.is_some() {
            crate::debug_event!("observer", "unwatched", "{id}");
        }
    }
}

/// Map a raw `notify` event onto the events reported for `root`.
fn translate(root: &FilePath, event: &Event) -> Vec<ChangeEvent> {
    if matches!(event.kind, EventKind::Access(_) | EventKind::Other) {
        return Vec::new();
    }

    let paths: Vec<FilePath> = event.paths.iter().map(FilePath::new).collect();

    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        if let [from, to] = paths.as_slice() {
            if from == root {
                return vec![ChangeEvent::ItemMoved { to: to.clone() }];
            }
            if from.is_descendant_of(root) || to.is_descendant_of(root) {
                return vec![ChangeEvent::SubitemMoved {
                    from: from.clone(),
                    to: to.clone(),
                }];
            }
        }
    }

    paths
        .into_iter()
        .filter_map(|path| {
            if &path == root {
                Some(ChangeEvent::ItemChanged)
            } else if path.is_descendant_of(root) {
                Some(ChangeEvent::SubitemChanged { path })
            } else {
                None
            }
        })
        .collect()
}

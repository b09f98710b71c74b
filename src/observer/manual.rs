//! In-memory change-notification service driven by explicit calls.
//!
//! Useful on platforms without a native facility and for exercising
//! observers deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::service::{ChangeEvent, ChangeNotificationService, EventSink, RegistrationId};
use super::ObserveError;
use crate::path::FilePath;

#[derive(Default)]
struct Registry {
    registrations: HashMap<RegistrationId, (FilePath, EventSink)>,
    reject_next: Option<String>,
}

/// A [`ChangeNotificationService`] whose events are posted by the caller.
#[derive(Default)]
pub struct ManualChangeService {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl ManualChangeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every registration for exactly `path`.
    ///
    /// Returns how many registrations received it.
    pub fn post(&self, path: &FilePath, event: ChangeEvent) -> usize {
        let registry = self.registry.lock();
        registry
            .registrations
            .values()
            .filter(|(registered, _)| registered == path)
            .filter(|(_, sink)| sink.send(event.clone()))
            .count()
    }

    /// Report a change of `subitem` to every registration for one of its ancestors.
    pub fn post_subitem(&self, subitem: &FilePath) -> usize {
        let registry = self.registry.lock();
        registry
            .registrations
            .values()
            .filter(|(registered, _)| subitem.is_descendant_of(registered))
            .filter(|(_, sink)| {
                sink.send(ChangeEvent::SubitemChanged {
                    path: subitem.clone(),
                })
            })
            .count()
    }

    /// Make the next `register` call fail with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.registry.lock().reject_next = Some(reason.into());
    }

    pub fn is_registered(&self, path: &FilePath) -> bool {
        self.registry
            .lock()
            .registrations
            .values()
            .any(|(registered, _)| registered == path)
    }

    pub fn registration_count(&self) -> usize {
        self.registry.lock().registrations.len()
    }
}

impl ChangeNotificationService for ManualChangeService {
    fn name(&self) -> &str {
        "manual"
    }

    fn register(&self, path: &FilePath, sink: EventSink) -> Result<RegistrationId, ObserveError> {
        let mut registry = self.registry.lock();
        if let Some(reason) = registry.reject_next.take() {
            return Err(ObserveError::registration(path, reason));
        }

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        registry.registrations.insert(id, (path.clone(), sink));
        Ok(id)
    }

    fn unregister(&self, id: RegistrationId) {
        self.registry.lock().registrations.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_post_reaches_only_matching_registrations() {
        let service = ManualChangeService::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        let a = FilePath::new("/a");
        let b = FilePath::new("/b");
        service.register(&a, EventSink::new(tx_a)).unwrap();
        service.register(&b, EventSink::new(tx_b)).unwrap();

        assert_eq!(service.post(&a, ChangeEvent::ItemChanged), 1);
        assert_eq!(rx_a.try_recv().unwrap(), ChangeEvent::ItemChanged);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_subitem_routes_to_ancestor() {
        let service = ManualChangeService::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dir = FilePath::new("/project");
        service.register(&dir, EventSink::new(tx)).unwrap();

        let file = FilePath::new("/project/src/main.rs");
        assert_eq!(service.post_subitem(&file), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            ChangeEvent::SubitemChanged { path: file }
        );
        assert_eq!(service.post_subitem(&FilePath::new("/other/x")), 0);
    }

    #[test]
    fn test_reject_next_then_recover() {
        let service = ManualChangeService::new();
        service.reject_next("permission denied");

        let path = FilePath::new("/locked");
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = service.register(&path, EventSink::new(tx.clone())).unwrap_err();
        assert!(matches!(err, ObserveError::Registration { ref reason, .. } if reason == "permission denied"));

        let id = service.register(&path, EventSink::new(tx)).unwrap();
        assert!(service.is_registered(&path));
        service.unregister(id);
        service.unregister(id);
        assert_eq!(service.registration_count(), 0);
    }
}

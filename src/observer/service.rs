//! The change-notification service seam and the events it delivers.

use std::fmt;

use tokio::sync::mpsc;

use super::ObserveError;
use crate::path::FilePath;

/// Events a change-notification service reports for a registered path.
///
/// Every variant qualifies: the observer invokes its callback for all of
/// them. Subitem detail is carried for logging and for services that want
/// to expose it, not for the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Content of an item below the registered directory changed.
    SubitemChanged { path: FilePath },
    /// An item below the registered directory moved.
    SubitemMoved { from: FilePath, to: FilePath },
    /// The registered item itself moved.
    ItemMoved { to: FilePath },
    /// Content of the registered item changed.
    ItemChanged,
    /// A new version of the item (or a subitem) appeared.
    VersionGained,
    /// A version of the item (or a subitem) was removed.
    VersionLost,
    /// A version conflict on the item (or a subitem) was resolved.
    ConflictResolved,
}

/// Opaque id a service hands out for one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a service pushes events for one registration.
///
/// Sending never blocks, so services may deliver from any thread,
/// including platform callback threads.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ChangeEvent>) -> Self {
        Self { tx }
    }

    /// Deliver an event. Returns `false` once the observer has gone away.
    pub fn send(&self, event: ChangeEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Platform facility that reports mutation, move and version events.
///
/// Implementations must deliver the events of one registration in the
/// order they observed them. Each registration is owned by exactly one
/// observer and is never shared.
pub trait ChangeNotificationService: Send + Sync {
    /// Service name for logging.
    fn name(&self) -> &str;

    /// Start reporting events for `path` into `sink`.
    fn register(&self, path: &FilePath, sink: EventSink) -> Result<RegistrationId, ObserveError>;

    /// Stop reporting for `id`. Unknown ids are ignored.
    fn unregister(&self, id: RegistrationId);
}

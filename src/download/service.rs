//! The remote status service seam.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::status::StatusItem;
use super::RemoteError;
use crate::path::FilePath;

/// Which items a status query matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPredicate {
    /// Exactly the item at this path.
    Equals(FilePath),
}

impl PathPredicate {
    pub fn matches(&self, path: &FilePath) -> bool {
        match self {
            PathPredicate::Equals(target) => target == path,
        }
    }
}

/// Portions of the remote index a query searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// User-visible documents of the app's container.
    Documents,
    /// Non-document data of the app's container.
    Data,
    /// Documents outside the container the app was granted access to.
    ExternalDocuments,
}

impl SearchScope {
    pub const ALL: [SearchScope; 3] = [
        SearchScope::Documents,
        SearchScope::Data,
        SearchScope::ExternalDocuments,
    ];
}

/// What to search for and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub predicate: PathPredicate,
    pub scopes: Vec<SearchScope>,
}

/// Lifecycle notifications of a live status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLifecycle {
    Started,
    Progress,
    Finished,
    Updated,
}

/// One lifecycle notification with a snapshot of the matching results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEvent {
    pub kind: QueryLifecycle,
    pub results: Vec<StatusItem>,
}

/// Opaque id a service hands out for one open query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Where a service pushes lifecycle events for one query.
#[derive(Debug, Clone)]
pub struct QuerySink {
    tx: mpsc::UnboundedSender<QueryEvent>,
}

impl QuerySink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<QueryEvent>) -> Self {
        Self { tx }
    }

    /// Deliver an event. Returns `false` once the task has gone away.
    pub fn send(&self, event: QueryEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Platform facility reporting download status of remote-synchronized items.
pub trait RemoteStatusService: Send + Sync {
    /// Service name for logging.
    fn name(&self) -> &str;

    /// Ask the provider to start pulling the item's content to local storage.
    fn begin_materializing(&self, path: &FilePath) -> Result<(), RemoteError>;

    /// Open a live query; lifecycle events flow into `sink` until stopped.
    fn open_query(&self, spec: QuerySpec, sink: QuerySink) -> Result<QueryId, RemoteError>;

    /// Stop a query. Unknown ids are ignored.
    fn stop_query(&self, id: QueryId);

    /// Whether the item is managed by the remote sync provider.
    fn is_remote_item(&self, _path: &FilePath) -> bool {
        false
    }

    /// A one-off status lookup without opening a query.
    fn current_status(&self, _path: &FilePath) -> Option<StatusItem> {
        None
    }
}

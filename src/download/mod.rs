//! Tracking a remote-synchronized file until it is materialized locally.
//!
//! [`DownloadWatcher::start_download`] asks the [`RemoteStatusService`] to
//! begin materializing a path, opens a status query scoped to that path and
//! resolves its completion exactly once: on the first `Current` status, or
//! on the first reported download error.

mod error;
mod local;
mod manual;
mod service;
mod status;
mod watcher;

pub use error::{DownloadError, RemoteError};
pub use local::LocalStatusService;
pub use manual::ManualStatusService;
pub use service::{
    PathPredicate, QueryEvent, QueryId, QueryLifecycle, QuerySink, QuerySpec, RemoteStatusService,
    SearchScope,
};
pub use status::{DownloadingStatus, Progress, StatusItem, TaskState};
pub use watcher::{DownloadTask, DownloadWatcher};

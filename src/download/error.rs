//! Error types for download tracking.

use thiserror::Error;

use crate::path::FilePath;

/// An error reported by the remote status service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct RemoteError {
    pub code: i32,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        RemoteError::new(e.raw_os_error().unwrap_or(-1), e.to_string())
    }
}

/// Failure outcomes of a download task.
///
/// Each is surfaced exactly once through the task's completion; nothing is
/// retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// The request to begin materializing was rejected. No query was opened.
    #[error("Cannot start downloading {path}: {source}")]
    MaterializationStart { path: FilePath, source: RemoteError },

    /// The status query reported a download error for the item.
    #[error("Download of {path} failed: {source}")]
    RemoteStatus { path: FilePath, source: RemoteError },

    /// The status query could not be opened.
    #[error("Cannot query download status of {path}: {source}")]
    QueryOpen { path: FilePath, source: RemoteError },

    /// The service closed the query before a terminal status arrived.
    #[error("Status query for {path} ended before the download finished")]
    QueryClosed { path: FilePath },

    /// The task was cancelled while a caller was still waiting on it.
    #[error("Download of {path} was cancelled")]
    Cancelled { path: FilePath },

    #[error("No async runtime available to track downloads")]
    NoRuntime,
}

impl DownloadError {
    /// The underlying service error, if the failure came from the service.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            DownloadError::MaterializationStart { source, .. }
            | DownloadError::RemoteStatus { source, .. }
            | DownloadError::QueryOpen { source, .. } => Some(source),
            _ => None,
        }
    }
}

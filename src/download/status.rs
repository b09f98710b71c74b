//! Download status attributes and their classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::RemoteError;
use crate::path::FilePath;

/// Download status attribute the remote index reports for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadingStatus {
    /// Only the remote copy exists.
    NotDownloaded,
    /// A local copy exists but a newer remote version is available.
    Downloaded,
    /// The local copy is the most recent version.
    Current,
}

/// One query result: the attributes reported for a matching item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusItem {
    pub path: FilePath,
    /// `None` while the index has no status information yet.
    pub status: Option<DownloadingStatus>,
    pub error: Option<RemoteError>,
}

impl StatusItem {
    pub fn new(path: FilePath) -> Self {
        Self {
            path,
            status: None,
            error: None,
        }
    }

    pub fn with_status(mut self, status: DownloadingStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_error(mut self, error: RemoteError) -> Self {
        self.error = Some(error);
        self
    }

    /// Classify this item. An error wins over any status.
    pub fn progress(&self) -> Progress {
        if let Some(error) = &self.error {
            return Progress::Failed(error.clone());
        }
        match self.status {
            Some(DownloadingStatus::Current) => Progress::Downloaded,
            _ => Progress::Downloading,
        }
    }
}

/// Classification of a query snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Still in progress, including "no status yet" and "no match yet".
    Downloading,
    Downloaded,
    Failed(RemoteError),
}

impl Progress {
    /// Classify a snapshot by its first result; later results are ignored.
    pub fn of(results: &[StatusItem]) -> Progress {
        results
            .first()
            .map(StatusItem::progress)
            .unwrap_or(Progress::Downloading)
    }
}

/// Lifecycle of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Idle,
    Searching,
    Downloading,
    Downloaded,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Terminal states perform no further action.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Downloaded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Idle => "idle",
            TaskState::Searching => "searching",
            TaskState::Downloading => "downloading",
            TaskState::Downloaded => "downloaded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> StatusItem {
        StatusItem::new(FilePath::new("/a/b.txt"))
    }

    #[test]
    fn test_error_wins_over_current_status() {
        let err = RemoteError::new(4, "quota exceeded");
        let failed = item()
            .with_status(DownloadingStatus::Current)
            .with_error(err.clone());
        assert_eq!(failed.progress(), Progress::Failed(err));
    }

    #[test]
    fn test_only_current_counts_as_downloaded() {
        assert_eq!(
            item().with_status(DownloadingStatus::Current).progress(),
            Progress::Downloaded
        );
        assert_eq!(
            item().with_status(DownloadingStatus::Downloaded).progress(),
            Progress::Downloading
        );
        assert_eq!(
            item().with_status(DownloadingStatus::NotDownloaded).progress(),
            Progress::Downloading
        );
    }

    #[test]
    fn test_missing_status_and_empty_results_are_in_progress() {
        assert_eq!(item().progress(), Progress::Downloading);
        assert_eq!(Progress::of(&[]), Progress::Downloading);
    }

    #[test]
    fn test_first_result_wins() {
        let results = vec![
            item().with_status(DownloadingStatus::NotDownloaded),
            item().with_status(DownloadingStatus::Current),
        ];
        assert_eq!(Progress::of(&results), Progress::Downloading);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Searching.is_terminal());
        assert!(!TaskState::Downloading.is_terminal());
        assert!(TaskState::Downloaded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }
}

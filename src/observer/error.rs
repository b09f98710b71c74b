//! Error types for path observation.

use thiserror::Error;

use crate::path::FilePath;

/// Errors from starting a [`PathObserver`](super::PathObserver).
#[derive(Error, Debug)]
pub enum ObserveError {
    /// The change-notification service refused the registration.
    #[error("Cannot observe {path}: {reason}")]
    Registration { path: FilePath, reason: String },

    /// No tokio runtime was configured or current to deliver events on.
    #[error("No async runtime available to deliver change events")]
    NoRuntime,
}

impl ObserveError {
    pub(crate) fn registration(path: &FilePath, reason: impl ToString) -> Self {
        ObserveError::Registration {
            path: path.clone(),
            reason: reason.to_string(),
        }
    }
}

//! A path value type with two asynchronous observation facilities:
//! change notification for a filesystem location ([`PathObserver`]) and
//! tracking of a remote-synchronized file until it is downloaded
//! ([`DownloadWatcher`]). Both can be consumed as cancellable streams
//! through [`subscription`].

pub mod logging;

pub mod cli;
pub mod config;
pub mod download;
pub mod observer;
pub mod path;
pub mod subscription;

pub use config::Settings;
pub use download::{DownloadError, DownloadTask, DownloadWatcher, RemoteStatusService, TaskState};
pub use observer::{ChangeEvent, ChangeNotificationService, ObserveError, ObserverHandle, PathObserver};
pub use path::FilePath;
pub use subscription::{ChangeStream, DownloadPublisher, DownloadStream, ObserverPublisher, Subscription};

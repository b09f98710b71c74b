//! Stream-style consumption of observers and download tasks.
//!
//! A publisher wraps one source and can be subscribed to exactly once:
//! `subscribe` consumes it, so a second concurrent subscriber cannot exist.
//! Subscribing starts production and returns the stream plus a
//! [`Subscription`]; cancelling (or dropping) the subscription stops the
//! source, after which the stream ends.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::config::ObserverConfig;
use crate::download::{DownloadError, DownloadTask, DownloadWatcher};
use crate::observer::{ChangeNotificationService, ObserveError, PathObserver};
use crate::path::FilePath;

enum Source {
    Observer(PathObserver),
    Download(DownloadTask),
}

/// Cancellation token for one subscription. Cancels on drop.
pub struct Subscription {
    source: Source,
    cancelled: AtomicBool,
}

impl Subscription {
    fn new(source: Source) -> Self {
        Self {
            source,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Stop the source. Idempotent; no event is forwarded after this returns.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        match &self.source {
            Source::Observer(observer) => observer.stop(),
            Source::Download(task) => task.cancel(),
        }
        crate::debug_event!("subscription", "cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Publishes every change a [`PathObserver`] reports.
pub struct ObserverPublisher {
    observer: PathObserver,
}

impl ObserverPublisher {
    /// Wrap an existing observer. Its current callback is replaced on subscribe.
    pub fn new(observer: PathObserver) -> Self {
        Self { observer }
    }

    /// Start observing `path` with no callback attached yet.
    pub fn for_path(
        service: Arc<dyn ChangeNotificationService>,
        path: FilePath,
    ) -> Result<Self, ObserveError> {
        Self::for_path_with_config(service, path, &ObserverConfig::default())
    }

    /// Like [`for_path`](Self::for_path), applying the `[observer]` settings.
    ///
    /// With `notify_on_attach` set, the stream yields the path once as soon
    /// as [`subscribe`](Self::subscribe) attaches.
    pub fn for_path_with_config(
        service: Arc<dyn ChangeNotificationService>,
        path: FilePath,
        config: &ObserverConfig,
    ) -> Result<Self, ObserveError> {
        let observer = PathObserver::builder(service).config(config).start(path)?;
        Ok(Self::new(observer))
    }

    pub fn path(&self) -> &FilePath {
        self.observer.path()
    }

    /// Attach the single subscriber.
    ///
    /// The stream yields the observed path for every change and never ends
    /// or fails on its own; it ends only once the subscription is cancelled.
    /// Events reported before this call were dropped, not buffered.
    pub fn subscribe(self) -> (ChangeStream, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer.replace(move |path: &FilePath| {
            let _ = tx.send(path.clone());
        });
        crate::debug_event!("subscription", "subscribed", "{}", self.observer.path());

        (
            ChangeStream { rx },
            Subscription::new(Source::Observer(self.observer)),
        )
    }
}

/// Unbounded, push-only stream of change notifications.
pub struct ChangeStream {
    rx: mpsc::UnboundedReceiver<FilePath>,
}

impl ChangeStream {
    /// Wait for the next change. `None` once the subscription was cancelled.
    pub async fn recv(&mut self) -> Option<FilePath> {
        self.rx.recv().await
    }
}

impl Stream for ChangeStream {
    type Item = FilePath;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Publishes the single outcome of a download.
pub struct DownloadPublisher {
    watcher: DownloadWatcher,
    path: FilePath,
}

impl DownloadPublisher {
    pub fn new(watcher: DownloadWatcher, path: FilePath) -> Self {
        Self { watcher, path }
    }

    /// Start the download. The stream yields exactly one outcome and ends,
    /// or ends without an outcome if the subscription is cancelled first.
    pub fn subscribe(self) -> (DownloadStream, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = self.watcher.start_download(self.path, move |outcome| {
            let _ = tx.send(outcome);
        });

        (
            DownloadStream { rx },
            Subscription::new(Source::Download(task)),
        )
    }
}

/// Single-item stream carrying a download outcome.
pub struct DownloadStream {
    rx: mpsc::UnboundedReceiver<Result<(), DownloadError>>,
}

impl DownloadStream {
    pub async fn recv(&mut self) -> Option<Result<(), DownloadError>> {
        self.rx.recv().await
    }
}

impl Stream for DownloadStream {
    type Item = Result<(), DownloadError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

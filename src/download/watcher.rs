//! The download watcher and its one-shot tasks.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::service::{
    PathPredicate, QueryEvent, QueryId, QuerySink, QuerySpec, RemoteStatusService, SearchScope,
};
use super::status::{DownloadingStatus, Progress, TaskState};
use super::DownloadError;
use crate::config::DownloadConfig;
use crate::path::FilePath;

type Completion = Box<dyn FnOnce(Result<(), DownloadError>) + Send>;

/// State of one `start_download` invocation.
struct TaskInner {
    path: FilePath,
    service: Arc<dyn RemoteStatusService>,
    state: Mutex<TaskState>,
    query: Mutex<Option<QueryId>>,
    /// Emptied exactly once, by whichever of finish or cancel gets there first.
    completion: Mutex<Option<Completion>>,
    /// Held while a completion is being fired, so cancel can wait it out.
    /// Reentrant because the completion may cancel its own task.
    firing: ReentrantMutex<()>,
    cancel: CancellationToken,
}

impl TaskInner {
    fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Move to a non-terminal state unless the task already ended.
    fn advance(&self, next: TaskState) {
        let mut state = self.state.lock();
        if !state.is_terminal() && *state != next {
            crate::debug_event!("download", "state", "{} {} -> {next}", self.path, *state);
            *state = next;
        }
    }

    fn stop_query(&self) {
        if let Some(id) = self.query.lock().take() {
            self.service.stop_query(id);
            crate::debug_event!("download", "query stopped", "{id} for {}", self.path);
        }
    }

    /// Tear down, then fire the completion. No-op if it already fired or was cancelled.
    fn finish(&self, state: TaskState, outcome: Result<(), DownloadError>) {
        let _firing = self.firing.lock();
        let Some(completion) = self.completion.lock().take() else {
            return;
        };
        *self.state.lock() = state;
        self.stop_query();
        self.cancel.cancel();

        match &outcome {
            Ok(()) => crate::log_event!("download", "completed", "{}", self.path),
            Err(e) => tracing::warn!("[download] {e}"),
        }
        completion(outcome);
    }

    /// Blocks while another thread is firing the completion.
    fn cancel(&self) {
        let _firing = self.firing.lock();
        let Some(completion) = self.completion.lock().take() else {
            return;
        };
        *self.state.lock() = TaskState::Cancelled;
        self.cancel.cancel();
        self.stop_query();
        drop(completion);
        crate::log_event!("download", "cancelled", "{}", self.path);
    }
}

/// Handle to one download task.
///
/// Dropping the handle does not cancel the task; the completion still fires.
#[derive(Clone)]
pub struct DownloadTask {
    inner: Arc<TaskInner>,
}

impl DownloadTask {
    pub fn path(&self) -> &FilePath {
        &self.inner.path
    }

    pub fn state(&self) -> TaskState {
        self.inner.state()
    }

    /// Whether the task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Stop the status query and discard the completion without firing it.
    ///
    /// Idempotent. Has no effect once the completion has fired. If another
    /// thread is firing the completion right now, waits for it to return, so
    /// the completion never runs after `cancel` returns.
    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

impl fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadTask")
            .field("path", &self.inner.path)
            .field("state", &self.state())
            .finish()
    }
}

/// Cancels the task when the awaiting future is dropped.
struct CancelOnDrop(DownloadTask);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Drives "wait until fully downloaded" operations against a remote status service.
#[derive(Clone)]
pub struct DownloadWatcher {
    service: Arc<dyn RemoteStatusService>,
    scopes: Vec<SearchScope>,
    runtime: Option<Handle>,
}

impl DownloadWatcher {
    /// Create a watcher searching every scope, delivering on the current runtime.
    pub fn new(service: Arc<dyn RemoteStatusService>) -> Self {
        Self {
            service,
            scopes: SearchScope::ALL.to_vec(),
            runtime: None,
        }
    }

    /// Create a watcher from the `[download]` section of the settings.
    pub fn with_config(service: Arc<dyn RemoteStatusService>, config: &DownloadConfig) -> Self {
        Self {
            service,
            scopes: config.scopes.clone(),
            runtime: None,
        }
    }

    /// Runtime whose tasks consume query events. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Begin materializing `path` and call `completion` exactly once when it
    /// is fully downloaded or fails.
    ///
    /// If the materialization request itself is rejected, `completion` runs
    /// before this function returns and no query is opened. Otherwise it
    /// runs on the watcher's runtime after the query has been stopped.
    pub fn start_download(
        &self,
        path: FilePath,
        completion: impl FnOnce(Result<(), DownloadError>) + Send + 'static,
    ) -> DownloadTask {
        let inner = Arc::new(TaskInner {
            path: path.clone(),
            service: Arc::clone(&self.service),
            state: Mutex::new(TaskState::Idle),
            query: Mutex::new(None),
            completion: Mutex::new(Some(Box::new(completion))),
            firing: ReentrantMutex::new(()),
            cancel: CancellationToken::new(),
        });
        let task = DownloadTask {
            inner: Arc::clone(&inner),
        };

        let runtime = match self.runtime.clone() {
            Some(handle) => handle,
            None => match Handle::try_current() {
                Ok(handle) => handle,
                Err(_) => {
                    inner.finish(TaskState::Failed, Err(DownloadError::NoRuntime));
                    return task;
                }
            },
        };

        if let Err(source) = self.service.begin_materializing(&path) {
            inner.finish(
                TaskState::Failed,
                Err(DownloadError::MaterializationStart { path, source }),
            );
            return task;
        }
        crate::debug_event!("download", "materializing", "{path} via {}", self.service.name());

        let (tx, rx) = mpsc::unbounded_channel();
        let spec = QuerySpec {
            predicate: PathPredicate::Equals(path.clone()),
            scopes: self.scopes.clone(),
        };
        match self.service.open_query(spec, QuerySink::new(tx)) {
            Ok(id) => {
                *inner.query.lock() = Some(id);
                inner.advance(TaskState::Searching);
                crate::debug_event!("download", "query opened", "{id} for {path}");
            }
            Err(source) => {
                inner.finish(
                    TaskState::Failed,
                    Err(DownloadError::QueryOpen { path, source }),
                );
                return task;
            }
        }

        runtime.spawn(track(inner, rx));
        task
    }

    /// Suspend until `path` is fully downloaded or the download fails.
    ///
    /// Dropping the returned future cancels the task: the query is stopped
    /// and no outcome is produced.
    pub async fn await_download(&self, path: FilePath) -> Result<(), DownloadError> {
        let (tx, rx) = oneshot::channel();
        let task = self.start_download(path.clone(), move |outcome| {
            let _ = tx.send(outcome);
        });
        let _guard = CancelOnDrop(task);

        rx.await
            .unwrap_or_else(|_| Err(DownloadError::Cancelled { path }))
    }

    /// Download `path` only if it is a remote item whose local copy is not current.
    pub async fn download_if_needed(&self, path: FilePath) -> Result<(), DownloadError> {
        if !self.service.is_remote_item(&path) {
            return Ok(());
        }
        let current = self
            .service
            .current_status(&path)
            .is_some_and(|item| item.error.is_none() && item.status == Some(DownloadingStatus::Current));
        if current {
            crate::debug_event!("download", "already current", "{path}");
            return Ok(());
        }
        self.await_download(path).await
    }

    /// Whether `path` is a remote item still represented by its placeholder name.
    pub fn is_non_downloaded(&self, path: &FilePath) -> bool {
        path.is_placeholder_name() && self.service.is_remote_item(path)
    }
}

impl fmt::Debug for DownloadWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadWatcher")
            .field("service", &self.service.name())
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Consume query events until a terminal status, cancellation or channel close.
async fn track(inner: Arc<TaskInner>, mut rx: mpsc::UnboundedReceiver<QueryEvent>) {
    loop {
        let event = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => return,
            event = rx.recv() => event,
        };

        let Some(event) = event else {
            let path = inner.path.clone();
            inner.finish(TaskState::Failed, Err(DownloadError::QueryClosed { path }));
            return;
        };

        // A late update may still arrive after teardown was requested.
        if inner.state().is_terminal() {
            return;
        }

        crate::debug_event!("download", "query event", "{:?} for {}", event.kind, inner.path);
        match Progress::of(&event.results) {
            Progress::Downloading => inner.advance(TaskState::Downloading),
            Progress::Downloaded => {
                inner.finish(TaskState::Downloaded, Ok(()));
                return;
            }
            Progress::Failed(source) => {
                let path = inner.path.clone();
                inner.finish(
                    TaskState::Failed,
                    Err(DownloadError::RemoteStatus { path, source }),
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{ManualStatusService, QueryLifecycle, RemoteError, StatusItem};
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn outcomes() -> (
        Arc<Mutex<Vec<Result<(), DownloadError>>>>,
        impl FnOnce(Result<(), DownloadError>) + Send + 'static,
    ) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&log);
        (log, move |outcome| inner.lock().push(outcome))
    }

    #[tokio::test]
    async fn test_downloading_then_current_completes_once() {
        let service = Arc::new(ManualStatusService::new());
        let watcher = DownloadWatcher::new(service.clone());
        let path = FilePath::new("/a/b.txt");
        let (log, completion) = outcomes();

        let task = watcher.start_download(path.clone(), completion);
        assert_eq!(task.state(), TaskState::Searching);
        assert_eq!(service.materialize_requests(), vec![path.clone()]);

        service.emit(QueryLifecycle::Started);
        service.update(StatusItem::new(path.clone()).with_status(DownloadingStatus::NotDownloaded));
        service.update(StatusItem::new(path.clone()).with_status(DownloadingStatus::NotDownloaded));
        settle().await;
        assert_eq!(task.state(), TaskState::Downloading);
        assert!(log.lock().is_empty());

        service.update(StatusItem::new(path.clone()).with_status(DownloadingStatus::Current));
        settle().await;

        assert_eq!(*log.lock(), vec![Ok(())]);
        assert_eq!(task.state(), TaskState::Downloaded);
        assert_eq!(service.open_query_count(), 0);
        assert_eq!(service.stopped_queries().len(), 1);
    }

    #[tokio::test]
    async fn test_error_attribute_fails_once_and_ignores_later_events() {
        let service = Arc::new(ManualStatusService::new());
        let watcher = DownloadWatcher::new(service.clone());
        let path = FilePath::new("/a/b.txt");
        let (log, completion) = outcomes();
        let err = RemoteError::new(28, "no space left on device");

        let task = watcher.start_download(path.clone(), completion);
        // Both queued before the task runs; only the first may count.
        service.update(StatusItem::new(path.clone()).with_error(err.clone()));
        service.update(StatusItem::new(path.clone()).with_status(DownloadingStatus::Current));
        settle().await;

        assert_eq!(
            *log.lock(),
            vec![Err(DownloadError::RemoteStatus {
                path: path.clone(),
                source: err
            })]
        );
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(service.update(StatusItem::new(path)), 0);
    }

    #[tokio::test]
    async fn test_rejected_materialization_fails_synchronously_without_query() {
        let service = Arc::new(ManualStatusService::new());
        service.reject_materializing(RemoteError::new(1, "not signed in"));
        let watcher = DownloadWatcher::new(service.clone());
        let (log, completion) = outcomes();

        let task = watcher.start_download(FilePath::new("/a/b.txt"), completion);

        assert!(matches!(
            log.lock().as_slice(),
            [Err(DownloadError::MaterializationStart { .. })]
        ));
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(service.open_query_count(), 0);
        assert!(service.stopped_queries().is_empty());
    }

    #[tokio::test]
    async fn test_query_open_failure_is_reported() {
        let service = Arc::new(ManualStatusService::new());
        service.reject_query(RemoteError::new(3, "index unavailable"));
        let watcher = DownloadWatcher::new(service.clone());

        let result = watcher.await_download(FilePath::new("/a/b.txt")).await;
        assert!(matches!(result, Err(DownloadError::QueryOpen { .. })));
    }

    #[tokio::test]
    async fn test_cancel_stops_query_and_suppresses_completion() {
        let service = Arc::new(ManualStatusService::new());
        let watcher = DownloadWatcher::new(service.clone());
        let path = FilePath::new("/a/b.txt");
        let (log, completion) = outcomes();

        let task = watcher.start_download(path.clone(), completion);
        service.update(StatusItem::new(path.clone()).with_status(DownloadingStatus::NotDownloaded));
        settle().await;

        task.cancel();
        task.cancel();
        assert_eq!(task.state(), TaskState::Cancelled);
        assert_eq!(service.open_query_count(), 0);

        service.set_status(StatusItem::new(path).with_status(DownloadingStatus::Current));
        service.emit(QueryLifecycle::Updated);
        settle().await;
        assert!(log.lock().is_empty());
    }

    /// Delegates to the in-memory service but takes a while to stop queries.
    struct SlowStopService {
        inner: ManualStatusService,
    }

    impl RemoteStatusService for SlowStopService {
        fn name(&self) -> &str {
            "slow-stop"
        }

        fn begin_materializing(&self, path: &FilePath) -> Result<(), RemoteError> {
            self.inner.begin_materializing(path)
        }

        fn open_query(&self, spec: QuerySpec, sink: QuerySink) -> Result<QueryId, RemoteError> {
            self.inner.open_query(spec, sink)
        }

        fn stop_query(&self, id: QueryId) {
            std::thread::sleep(Duration::from_millis(300));
            self.inner.stop_query(id);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_waits_for_completion_in_flight() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let service = Arc::new(SlowStopService {
            inner: ManualStatusService::new(),
        });
        let watcher = DownloadWatcher::new(service.clone());
        let path = FilePath::new("/cloud/slow.txt");
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let task = watcher.start_download(path.clone(), move |outcome| {
            assert!(outcome.is_ok());
            flag.store(true, Ordering::SeqCst);
        });
        service
            .inner
            .update(StatusItem::new(path).with_status(DownloadingStatus::Current));

        // The tracker is now inside stop_query, about to fire.
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.cancel();

        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(task.state(), TaskState::Downloaded);
    }

    #[tokio::test]
    async fn test_closed_query_fails_task() {
        let service = Arc::new(ManualStatusService::new());
        let watcher = DownloadWatcher::new(service.clone());
        let path = FilePath::new("/a/b.txt");

        let handle = tokio::spawn({
            let watcher = watcher.clone();
            let path = path.clone();
            async move { watcher.await_download(path).await }
        });
        settle().await;
        service.close_queries();

        let result = handle.await.unwrap();
        assert_eq!(result, Err(DownloadError::QueryClosed { path }));
    }

    #[tokio::test]
    async fn test_await_download_resolves_on_current() {
        let service = Arc::new(ManualStatusService::new());
        let watcher = DownloadWatcher::new(service.clone());
        let path = FilePath::new("/cloud/report.pdf");

        let waiting = tokio::spawn({
            let watcher = watcher.clone();
            let path = path.clone();
            async move { watcher.await_download(path).await }
        });
        settle().await;
        service.update(StatusItem::new(path).with_status(DownloadingStatus::Current));

        assert_eq!(waiting.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_dropping_await_download_cancels() {
        let service = Arc::new(ManualStatusService::new());
        let watcher = DownloadWatcher::new(service.clone());
        let path = FilePath::new("/cloud/big.mov");

        let timed_out =
            tokio::time::timeout(Duration::from_millis(30), watcher.await_download(path)).await;
        assert!(timed_out.is_err());
        assert_eq!(service.open_query_count(), 0);
        assert_eq!(service.stopped_queries().len(), 1);
    }

    #[tokio::test]
    async fn test_download_if_needed_skips_current_and_local_items() {
        let service = Arc::new(ManualStatusService::new());
        let watcher = DownloadWatcher::new(service.clone());

        // Not managed by the provider at all
        assert_eq!(watcher.download_if_needed(FilePath::new("/local.txt")).await, Ok(()));

        let path = FilePath::new("/cloud/current.txt");
        service.set_status(StatusItem::new(path.clone()).with_status(DownloadingStatus::Current));
        assert_eq!(watcher.download_if_needed(path).await, Ok(()));
        assert!(service.materialize_requests().is_empty());
    }

    #[test]
    fn test_non_downloaded_requires_remote_placeholder() {
        let service = Arc::new(ManualStatusService::new());
        let watcher = DownloadWatcher::new(service.clone());
        let placeholder = FilePath::new("/cloud/.report.pdf.icloud");

        assert!(!watcher.is_non_downloaded(&placeholder));
        service.mark_remote(placeholder.clone());
        assert!(watcher.is_non_downloaded(&placeholder));
        assert!(!watcher.is_non_downloaded(&placeholder.without_placeholder()));
    }

    #[test]
    fn test_no_runtime_fails_without_materializing() {
        let service = Arc::new(ManualStatusService::new());
        let watcher = DownloadWatcher::new(service.clone());
        let (log, completion) = outcomes();

        watcher.start_download(FilePath::new("/a"), completion);
        assert_eq!(*log.lock(), vec![Err(DownloadError::NoRuntime)]);
        assert!(service.materialize_requests().is_empty());
    }
}

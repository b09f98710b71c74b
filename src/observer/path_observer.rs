//! The path observer and its observation session.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::service::{ChangeEvent, ChangeNotificationService, EventSink, RegistrationId};
use super::ObserveError;
use crate::config::ObserverConfig;
use crate::path::FilePath;

/// Callback invoked with the registered path on every qualifying event.
pub type OnChange = Box<dyn FnMut(&FilePath) + Send>;

/// The single callback slot.
///
/// `generation` changes on every replacement so an invocation that took the
/// callback out can tell whether it may put it back.
#[derive(Default)]
struct CallbackSlot {
    callback: Option<OnChange>,
    generation: u64,
}

/// State shared by a [`PathObserver`], its handles and its dispatcher task.
struct Session {
    path: FilePath,
    service: Arc<dyn ChangeNotificationService>,
    registration: Mutex<Option<RegistrationId>>,
    /// Reentrant so the callback itself may replace, clear or stop.
    slot: ReentrantMutex<RefCell<CallbackSlot>>,
    stopped: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    notify_on_attach: bool,
}

impl Session {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Run the current callback once, serialized with replacement and stop.
    fn invoke(&self) {
        let guard = self.slot.lock();
        if self.is_stopped() {
            return;
        }

        let (taken, generation) = {
            let mut slot = guard.borrow_mut();
            (slot.callback.take(), slot.generation)
        };
        let Some(mut callback) = taken else {
            crate::debug_event!("observer", "dropped", "no callback for {}", self.path);
            return;
        };

        callback(&self.path);

        let mut slot = guard.borrow_mut();
        if slot.generation == generation && !self.is_stopped() {
            slot.callback = Some(callback);
        }
    }

    fn attach(&self, callback: Option<OnChange>) {
        let guard = self.slot.lock();
        let previous = {
            let mut slot = guard.borrow_mut();
            slot.generation = slot.generation.wrapping_add(1);
            std::mem::replace(&mut slot.callback, callback)
        };
        drop(previous);

        if self.notify_on_attach && guard.borrow().callback.is_some() {
            self.invoke();
        }
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            if let Some(id) = self.registration.lock().take() {
                self.service.unregister(id);
            }
            if let Some(task) = self.dispatcher.lock().take() {
                task.abort();
            }
            crate::log_event!("observer", "stopped", "{}", self.path);
        }

        // Waits for an invocation running on another thread to finish.
        let guard = self.slot.lock();
        let callback = guard.borrow_mut().callback.take();
        drop(guard);
        drop(callback);
    }
}

/// Observes one filesystem location and reports changes to a callback.
///
/// Registration happens in [`PathObserverBuilder::start`]; the callback is
/// invoked on the configured runtime, serialized, in the order the service
/// reported events. Every event delivers the originally registered path,
/// never the subitem path.
///
/// After [`stop`](Self::stop) returns no new invocation begins. An
/// invocation already running on another thread finishes before `stop`
/// returns; events the service had queued but not yet dispatched are
/// discarded. Dropping the observer stops it.
pub struct PathObserver {
    session: Arc<Session>,
}

impl PathObserver {
    /// Create a builder for configuring an observer.
    pub fn builder(service: Arc<dyn ChangeNotificationService>) -> PathObserverBuilder {
        PathObserverBuilder::new(service)
    }

    /// Register for `path` on the current runtime with `on_change` attached.
    pub fn start(
        service: Arc<dyn ChangeNotificationService>,
        path: FilePath,
        on_change: impl FnMut(&FilePath) + Send + 'static,
    ) -> Result<Self, ObserveError> {
        Self::builder(service).on_change(on_change).start(path)
    }

    pub fn path(&self) -> &FilePath {
        &self.session.path
    }

    /// Swap the callback without re-registering.
    pub fn replace(&self, on_change: impl FnMut(&FilePath) + Send + 'static) {
        self.session.attach(Some(Box::new(on_change)));
    }

    /// Remove the callback; events are dropped until one is attached again.
    pub fn clear(&self) {
        self.session.attach(None);
    }

    /// Unregister from the service. Idempotent, never fails.
    pub fn stop(&self) {
        self.session.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.session.is_stopped()
    }

    /// A cloneable handle that can stop this observer from elsewhere.
    pub fn handle(&self) -> ObserverHandle {
        ObserverHandle {
            session: Arc::clone(&self.session),
        }
    }
}

impl Drop for PathObserver {
    fn drop(&mut self) {
        self.session.stop();
    }
}

impl fmt::Debug for PathObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathObserver")
            .field("path", &self.session.path)
            .field("service", &self.session.service.name())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Cloneable stop handle for a [`PathObserver`].
///
/// Dropping a handle does not stop the observer.
#[derive(Clone)]
pub struct ObserverHandle {
    session: Arc<Session>,
}

impl ObserverHandle {
    pub fn path(&self) -> &FilePath {
        &self.session.path
    }

    pub fn stop(&self) {
        self.session.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.session.is_stopped()
    }
}

impl fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("path", &self.session.path)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Builder for constructing a [`PathObserver`].
pub struct PathObserverBuilder {
    service: Arc<dyn ChangeNotificationService>,
    runtime: Option<Handle>,
    on_change: Option<OnChange>,
    notify_on_attach: bool,
}

impl PathObserverBuilder {
    pub fn new(service: Arc<dyn ChangeNotificationService>) -> Self {
        Self {
            service,
            runtime: None,
            on_change: None,
            notify_on_attach: false,
        }
    }

    /// Runtime whose tasks deliver events. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Callback attached before the first event can arrive.
    pub fn on_change(mut self, on_change: impl FnMut(&FilePath) + Send + 'static) -> Self {
        self.on_change = Some(Box::new(on_change));
        self
    }

    /// Invoke a callback once as soon as it is attached or replaced.
    ///
    /// This invocation runs on the thread that attaches the callback
    /// (inside [`start`](Self::start) or [`PathObserver::replace`]), before
    /// that call returns, not on the configured runtime. It is still
    /// serialized with event delivery.
    pub fn notify_on_attach(mut self, enabled: bool) -> Self {
        self.notify_on_attach = enabled;
        self
    }

    /// Apply the `[observer]` section of the settings.
    pub fn config(self, config: &ObserverConfig) -> Self {
        self.notify_on_attach(config.notify_on_attach)
    }

    /// Register with the service and start delivering events.
    pub fn start(self, path: FilePath) -> Result<PathObserver, ObserveError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| ObserveError::NoRuntime)?,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.service.register(&path, EventSink::new(tx))?;

        let session = Arc::new(Session {
            path,
            service: self.service,
            registration: Mutex::new(Some(id)),
            slot: ReentrantMutex::new(RefCell::new(CallbackSlot::default())),
            stopped: AtomicBool::new(false),
            dispatcher: Mutex::new(None),
            notify_on_attach: self.notify_on_attach,
        });

        if self.on_change.is_some() {
            session.attach(self.on_change);
        }

        let task = runtime.spawn(dispatch(Arc::clone(&session), rx));
        *session.dispatcher.lock() = Some(task);

        crate::log_event!(
            "observer",
            "registered",
            "{} via {} {id}",
            session.path,
            session.service.name()
        );

        Ok(PathObserver { session })
    }
}

/// Deliver queued events one at a time until the session stops.
async fn dispatch(session: Arc<Session>, mut rx: mpsc::UnboundedReceiver<ChangeEvent>) {
    while let Some(event) = rx.recv().await {
        if session.is_stopped() {
            break;
        }
        crate::debug_event!("observer", "event", "{event:?} at {}", session.path);
        session.invoke();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ManualChangeService;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut(&FilePath) + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_: &FilePath| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_every_event_kind_invokes_callback_with_registered_path() {
        let service = Arc::new(ManualChangeService::new());
        let path = FilePath::new("/docs");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let _observer = PathObserver::start(service.clone(), path.clone(), move |p| {
            sink.lock().push(p.clone());
        })
        .unwrap();

        let events = [
            ChangeEvent::SubitemChanged {
                path: FilePath::new("/docs/a.txt"),
            },
            ChangeEvent::ItemMoved {
                to: FilePath::new("/moved"),
            },
            ChangeEvent::ItemChanged,
            ChangeEvent::VersionGained,
            ChangeEvent::VersionLost,
            ChangeEvent::ConflictResolved,
        ];
        for event in events {
            service.post(&path, event);
        }
        settle().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 6);
        assert!(seen.iter().all(|p| p == &path));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_silences_callback() {
        let service = Arc::new(ManualChangeService::new());
        let path = FilePath::new("/a/b.txt");
        let (count, on_change) = counter();

        let observer = PathObserver::start(service.clone(), path.clone(), on_change).unwrap();
        service.post(&path, ChangeEvent::ItemChanged);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        observer.stop();
        observer.stop();
        observer.handle().stop();
        assert!(observer.is_stopped());
        assert!(!service.is_registered(&path));

        service.post(&path, ChangeEvent::ItemChanged);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queued_events_are_discarded_after_stop() {
        let service = Arc::new(ManualChangeService::new());
        let path = FilePath::new("/queued");
        let (count, on_change) = counter();

        let observer = PathObserver::start(service.clone(), path.clone(), on_change).unwrap();
        // Queued but the dispatcher has not run yet on this single-threaded runtime
        service.post(&path, ChangeEvent::ItemChanged);
        service.post(&path, ChangeEvent::ItemChanged);
        observer.stop();
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_replace_swaps_callback_without_reregistering() {
        let service = Arc::new(ManualChangeService::new());
        let path = FilePath::new("/swap");
        let (first, on_first) = counter();
        let (second, on_second) = counter();

        let observer = PathObserver::start(service.clone(), path.clone(), on_first).unwrap();
        service.post(&path, ChangeEvent::ItemChanged);
        settle().await;

        observer.replace(on_second);
        service.post(&path, ChangeEvent::ItemChanged);
        service.post(&path, ChangeEvent::ItemChanged);
        settle().await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert_eq!(service.registration_count(), 1);
    }

    #[tokio::test]
    async fn test_cleared_callback_drops_events() {
        let service = Arc::new(ManualChangeService::new());
        let path = FilePath::new("/cleared");
        let (count, on_change) = counter();

        let observer = PathObserver::start(service.clone(), path.clone(), on_change).unwrap();
        observer.clear();
        service.post(&path, ChangeEvent::ItemChanged);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!observer.is_stopped());
    }

    #[tokio::test]
    async fn test_callback_may_stop_its_own_observer() {
        let service = Arc::new(ManualChangeService::new());
        let path = FilePath::new("/self-stop");
        let count = Arc::new(AtomicUsize::new(0));

        let observer = PathObserver::builder(service.clone()).start(path.clone()).unwrap();
        let handle = observer.handle();
        let inner = Arc::clone(&count);
        observer.replace(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
            handle.stop();
        });

        service.post(&path, ChangeEvent::ItemChanged);
        service.post(&path, ChangeEvent::ItemChanged);
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(observer.is_stopped());
    }

    #[tokio::test]
    async fn test_notify_on_attach_fires_immediately() {
        let service = Arc::new(ManualChangeService::new());
        let (count, on_change) = counter();

        let observer = PathObserver::builder(service)
            .notify_on_attach(true)
            .on_change(on_change)
            .start(FilePath::new("/eager"))
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let (replaced, on_replaced) = counter();
        observer.replace(on_replaced);
        assert_eq!(replaced.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attach_notification_runs_on_attaching_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let service = Arc::new(ManualChangeService::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let config = ObserverConfig {
            notify_on_attach: true,
            ..ObserverConfig::default()
        };

        let observer = PathObserver::builder(service)
            .runtime(runtime.handle().clone())
            .config(&config)
            .on_change(move |_| sink.lock().push(std::thread::current().id()))
            .start(FilePath::new("/eager"))
            .unwrap();

        // Recorded before start returned, on this thread
        assert_eq!(*seen.lock(), vec![std::thread::current().id()]);
        observer.stop();
    }

    #[tokio::test]
    async fn test_sessions_never_cross_deliver() {
        let service = Arc::new(ManualChangeService::new());
        let a = FilePath::new("/a");
        let b = FilePath::new("/b");
        let (count_a, on_a) = counter();
        let (count_b, on_b) = counter();

        let _observer_a = PathObserver::start(service.clone(), a.clone(), on_a).unwrap();
        let _observer_b = PathObserver::start(service.clone(), b.clone(), on_b).unwrap();

        service.post(&a, ChangeEvent::ItemChanged);
        service.post(&a, ChangeEvent::VersionGained);
        service.post(&b, ChangeEvent::ItemChanged);
        settle().await;

        assert_eq!(count_a.load(Ordering::SeqCst), 2);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_registration_failure_is_raised() {
        let service = Arc::new(ManualChangeService::new());
        service.reject_next("sandbox denied");

        let result = PathObserver::start(service.clone(), FilePath::new("/denied"), |_| {});
        assert!(matches!(result, Err(ObserveError::Registration { .. })));
        assert_eq!(service.registration_count(), 0);
    }

    #[test]
    fn test_no_runtime_is_an_error() {
        let service = Arc::new(ManualChangeService::new());
        let result = PathObserver::builder(service).start(FilePath::new("/x"));
        assert!(matches!(result, Err(ObserveError::NoRuntime)));
    }

    #[test]
    fn test_explicit_runtime_handle() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let service = Arc::new(ManualChangeService::new());
        let path = FilePath::new("/explicit");
        let (count, on_change) = counter();

        let observer = PathObserver::builder(service.clone())
            .runtime(runtime.handle().clone())
            .on_change(on_change)
            .start(path.clone())
            .unwrap();
        service.post(&path, ChangeEvent::ItemChanged);
        runtime.block_on(settle());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(observer);
        assert!(!service.is_registered(&path));
    }
}

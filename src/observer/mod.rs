//! Change observation for a single filesystem location.
//!
//! A [`PathObserver`] owns one registration with a
//! [`ChangeNotificationService`] and forwards every qualifying event to a
//! single replaceable callback.
//!
//! # Architecture
//!
//! ```text
//! ChangeNotificationService (notify, in-memory, ...)
//!         |  ChangeEvent via EventSink
//!         v
//!   dispatcher task (one per observer, on the configured runtime)
//!         |  serialized
//!         v
//!   on_change(&FilePath)
//! ```

mod error;
mod manual;
mod notify_service;
mod path_observer;
mod service;

pub use error::ObserveError;
pub use manual::ManualChangeService;
pub use notify_service::NotifyChangeService;
pub use path_observer::{ObserverHandle, OnChange, PathObserver, PathObserverBuilder};
pub use service::{ChangeEvent, ChangeNotificationService, EventSink, RegistrationId};

//! Remote status service for platforms without cloud sync.
//!
//! Every existing file is already local, so a query reports `Current` at
//! once; a missing file reports the lookup error. Every path counts as a
//! remote item, so `download_if_needed` still fails for a missing file.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::service::{
    PathPredicate, QueryEvent, QueryId, QueryLifecycle, QuerySink, QuerySpec, RemoteStatusService,
};
use super::status::{DownloadingStatus, StatusItem};
use super::RemoteError;
use crate::path::FilePath;

/// [`RemoteStatusService`] answering from the local filesystem.
#[derive(Default)]
pub struct LocalStatusService {
    next_id: AtomicU64,
    open: Mutex<HashSet<QueryId>>,
}

impl LocalStatusService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_query_count(&self) -> usize {
        self.open.lock().len()
    }

    fn lookup(path: &FilePath) -> StatusItem {
        match std::fs::metadata(path.as_path()) {
            Ok(_) => StatusItem::new(path.clone()).with_status(DownloadingStatus::Current),
            Err(e) => StatusItem::new(path.clone()).with_error(RemoteError::from(e)),
        }
    }
}

impl RemoteStatusService for LocalStatusService {
    fn name(&self) -> &str {
        "local"
    }

    fn begin_materializing(&self, path: &FilePath) -> Result<(), RemoteError> {
        std::fs::metadata(path.as_path())
            .map(|_| ())
            .map_err(RemoteError::from)
    }

    fn open_query(&self, spec: QuerySpec, sink: QuerySink) -> Result<QueryId, RemoteError> {
        let id = QueryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.open.lock().insert(id);

        let PathPredicate::Equals(target) = &spec.predicate;
        let results = vec![Self::lookup(target)];
        for kind in [QueryLifecycle::Started, QueryLifecycle::Finished] {
            sink.send(QueryEvent {
                kind,
                results: results.clone(),
            });
        }
        Ok(id)
    }

    fn stop_query(&self, id: QueryId) {
        self.open.lock().remove(&id);
    }

    fn is_remote_item(&self, _path: &FilePath) -> bool {
        true
    }

    fn current_status(&self, path: &FilePath) -> Option<StatusItem> {
        Some(Self::lookup(path))
    }
}

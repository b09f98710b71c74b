//! In-memory remote status service driven by explicit calls.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::service::{
    QueryEvent, QueryId, QueryLifecycle, QuerySink, QuerySpec, RemoteStatusService,
};
use super::status::StatusItem;
use super::RemoteError;
use crate::path::FilePath;

struct OpenQuery {
    spec: QuerySpec,
    sink: QuerySink,
}

#[derive(Default)]
struct State {
    next_id: u64,
    items: HashMap<FilePath, StatusItem>,
    remote: HashSet<FilePath>,
    queries: HashMap<QueryId, OpenQuery>,
    stopped: Vec<QueryId>,
    materialize_requests: Vec<FilePath>,
    reject_materializing: Option<RemoteError>,
    reject_query: Option<RemoteError>,
}

/// A [`RemoteStatusService`] whose index is edited by the caller.
///
/// Status changes are stored with [`set_status`](Self::set_status) and
/// announced to open queries with [`emit`](Self::emit); [`update`](Self::update)
/// does both.
#[derive(Default)]
pub struct ManualStatusService {
    state: Mutex<State>,
}

impl ManualStatusService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an item's attributes without notifying queries.
    pub fn set_status(&self, item: StatusItem) {
        let mut state = self.state.lock();
        state.remote.insert(item.path.clone());
        state.items.insert(item.path.clone(), item);
    }

    /// Send a lifecycle event to every open query. Returns how many received it.
    pub fn emit(&self, kind: QueryLifecycle) -> usize {
        let state = self.state.lock();
        let mut delivered = 0;
        for query in state.queries.values() {
            let results: Vec<StatusItem> = state
                .items
                .values()
                .filter(|item| query.spec.predicate.matches(&item.path))
                .cloned()
                .collect();
            if query.sink.send(QueryEvent { kind, results }) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Record `item` and announce it as an update.
    pub fn update(&self, item: StatusItem) -> usize {
        self.set_status(item);
        self.emit(QueryLifecycle::Updated)
    }

    /// Mark a path as managed by the sync provider.
    pub fn mark_remote(&self, path: FilePath) {
        self.state.lock().remote.insert(path);
    }

    /// Make every `begin_materializing` call fail with `error`.
    pub fn reject_materializing(&self, error: RemoteError) {
        self.state.lock().reject_materializing = Some(error);
    }

    /// Make every `open_query` call fail with `error`.
    pub fn reject_query(&self, error: RemoteError) {
        self.state.lock().reject_query = Some(error);
    }

    /// Drop every open query without stopping it, as a crashed provider would.
    pub fn close_queries(&self) {
        self.state.lock().queries.clear();
    }

    pub fn open_query_count(&self) -> usize {
        self.state.lock().queries.len()
    }

    /// Ids of queries that were stopped, in stop order.
    pub fn stopped_queries(&self) -> Vec<QueryId> {
        self.state.lock().stopped.clone()
    }

    /// Paths `begin_materializing` was called for, in call order.
    pub fn materialize_requests(&self) -> Vec<FilePath> {
        self.state.lock().materialize_requests.clone()
    }
}

impl RemoteStatusService for ManualStatusService {
    fn name(&self) -> &str {
        "manual"
    }

    fn begin_materializing(&self, path: &FilePath) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.materialize_requests.push(path.clone());
        match &state.reject_materializing {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn open_query(&self, spec: QuerySpec, sink: QuerySink) -> Result<QueryId, RemoteError> {
        let mut state = self.state.lock();
        if let Some(error) = &state.reject_query {
            return Err(error.clone());
        }

        let id = QueryId(state.next_id);
        state.next_id += 1;
        state.queries.insert(id, OpenQuery { spec, sink });
        Ok(id)
    }

    fn stop_query(&self, id: QueryId) {
        let mut state = self.state.lock();
        if state.queries.remove(&id).is_some() {
            state.stopped.push(id);
        }
    }

    fn is_remote_item(&self, path: &FilePath) -> bool {
        self.state.lock().remote.contains(path)
    }

    fn current_status(&self, path: &FilePath) -> Option<StatusItem> {
        self.state.lock().items.get(path).cloned()
    }
}

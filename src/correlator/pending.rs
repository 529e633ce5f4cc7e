use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::{EndpointId, RequestId, Result, RpcError};

/// What a waiting caller eventually receives.
pub(super) type Resolution = Result<Value>;

/// An outstanding CALL awaiting its answer.
pub(super) struct PendingRequest {
    // ---
    pub destination: EndpointId,
    pub action: String,
    pub submitted_at: Instant,
    pub timeout: Duration,
    slot: oneshot::Sender<Resolution>,
    timer: Option<AbortHandle>,
}

impl PendingRequest {
    pub fn new(
        destination: EndpointId,
        action: impl Into<String>,
        timeout: Duration,
        slot: oneshot::Sender<Resolution>,
    ) -> Self {
        // ---
        Self {
            destination,
            action: action.into(),
            submitted_at: Instant::now(),
            timeout,
            slot,
            timer: None,
        }
    }

    /// Stop the timeout task, if one is still scheduled.
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Deliver the resolution to the caller.
    ///
    /// Returns `false` when the caller stopped waiting (dropped its future).
    pub fn deliver(mut self, resolution: Resolution) -> bool {
        // ---
        self.disarm();
        self.slot.send(resolution).is_ok()
    }
}

/// Requests in flight, keyed by request id.
///
/// Removal is the only way an entry leaves the table, and `DashMap` makes it
/// atomic per key: whichever path removes an entry owns its resolution, and
/// every other path racing for the same id gets `None`.
pub(super) struct PendingTable {
    // ---
    requests: DashMap<RequestId, PendingRequest>,
}

impl PendingTable {
    pub fn new() -> Self {
        // ---
        Self {
            requests: DashMap::new(),
        }
    }

    /// Insert a new entry; an id that is already in flight is rejected.
    pub fn register(&self, request_id: RequestId, request: PendingRequest) -> Result<()> {
        // ---
        match self.requests.entry(request_id) {
            Entry::Occupied(occupied) => {
                Err(RpcError::DuplicateRequestId(occupied.key().clone()))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(request);
                Ok(())
            }
        }
    }

    /// Hand the timeout task's abort handle to its entry.
    ///
    /// If the entry is already gone the request resolved first, and the
    /// timer is stopped right away.
    pub fn attach_timer(&self, request_id: &RequestId, timer: AbortHandle) {
        // ---
        match self.requests.get_mut(request_id) {
            Some(mut entry) => entry.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Remove an entry regardless of where it was sent.
    pub fn take(&self, request_id: &RequestId) -> Option<PendingRequest> {
        self.requests.remove(request_id).map(|(_, request)| request)
    }

    /// Remove an entry only if it was sent to `source`.
    ///
    /// A response with the right id from the wrong endpoint does not belong
    /// to this request.
    pub fn take_from(
        &self,
        request_id: &RequestId,
        source: &EndpointId,
    ) -> Option<PendingRequest> {
        self.requests
            .remove_if(request_id, |_, request| request.destination == *source)
            .map(|(_, request)| request)
    }

    /// Remove every entry sent to `destination`.
    pub fn take_for_destination(
        &self,
        destination: &EndpointId,
    ) -> Vec<(RequestId, PendingRequest)> {
        // ---
        // Collect keys first: removing while iterating would deadlock on the
        // shard locks.
        let ids: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|entry| entry.destination == *destination)
            .map(|entry| entry.key().clone())
            .collect();

        ids.iter()
            .filter_map(|id| {
                self.requests
                    .remove_if(id, |_, request| request.destination == *destination)
            })
            .collect()
    }

    /// Remove every entry.
    pub fn drain(&self) -> Vec<(RequestId, PendingRequest)> {
        // ---
        let ids: Vec<RequestId> = self
            .requests
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        ids.iter().filter_map(|id| self.requests.remove(id)).collect()
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.requests.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}

//! Process-local request queue.
//!
//! All state sits behind one mutex so enqueue, cancel, promotion, and
//! completion are serialized around the slot counters. Every mutation that
//! may open a slot or add work wakes the admission loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info};

use terasync_core::config::files::FilesConfig;
use terasync_core::error::AppError;
use terasync_core::result::AppResult;
use terasync_core::types::{ContentHash, RequestId, Uid};

use crate::state::{DownloadRequest, Lane, RequestState};

/// Slot limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Maximum Active requests across both lanes.
    pub max_active: usize,
    /// Slots reserved for the priority lane, out of `max_active`.
    pub priority_lane: usize,
}

impl QueueLimits {
    pub fn new(max_active: usize, priority_lane: usize) -> Self {
        let max_active = max_active.max(1);
        Self {
            max_active,
            priority_lane: priority_lane.min(max_active.saturating_sub(1)),
        }
    }

    fn normal_slots(&self) -> usize {
        self.max_active - self.priority_lane
    }
}

impl From<&FilesConfig> for QueueLimits {
    fn from(config: &FilesConfig) -> Self {
        Self::new(config.max_active_requests, config.priority_lane_size)
    }
}

/// Counters exposed on the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued_normal: usize,
    pub queued_priority: usize,
    pub active_normal: usize,
    pub active_priority: usize,
    pub max_active: usize,
    pub priority_lane: usize,
    pub completed_total: u64,
    pub cancelled_total: u64,
}

/// Proof that a pull started on a specific activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullTicket {
    pub request_id: RequestId,
    pub owner: Uid,
    pub hashes: Vec<ContentHash>,
    pub(crate) activation: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    requests: HashMap<RequestId, DownloadRequest>,
    normal: VecDeque<RequestId>,
    priority: VecDeque<RequestId>,
    active_normal: usize,
    active_priority: usize,
    next_activation: u64,
    completed_total: u64,
    cancelled_total: u64,
}

impl QueueState {
    fn lane_queue(&mut self, lane: Lane) -> &mut VecDeque<RequestId> {
        match lane {
            Lane::Normal => &mut self.normal,
            Lane::Priority => &mut self.priority,
        }
    }

    fn release_slot(&mut self, lane: Lane) {
        match lane {
            Lane::Normal => self.active_normal = self.active_normal.saturating_sub(1),
            Lane::Priority => self.active_priority = self.active_priority.saturating_sub(1),
        }
    }

    /// Take the request out of the table on its way to `next`.
    fn retire(&mut self, id: &RequestId, next: RequestState) -> Option<DownloadRequest> {
        let request = self.requests.get(id)?;
        if !request.state.can_transition_to(next) {
            return None;
        }
        let mut request = self.requests.remove(id)?;
        match request.state {
            RequestState::Queued => {
                let lane = request.lane;
                self.lane_queue(lane).retain(|queued| queued != id);
            }
            RequestState::Active => self.release_slot(request.lane),
            _ => {}
        }
        request.state = next;
        match next {
            RequestState::Completed => self.completed_total += 1,
            RequestState::Cancelled => self.cancelled_total += 1,
            _ => {}
        }
        Some(request)
    }
}

/// Queue of download requests with a two-lane admission policy.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    state: Arc<Mutex<QueueState>>,
    changed: Arc<Notify>,
    limits: QueueLimits,
}

impl RequestQueue {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            changed: Arc::new(Notify::new()),
            limits,
        }
    }

    pub fn limits(&self) -> QueueLimits {
        self.limits
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // No await points under the lock; poisoning leaves no torn state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a request. Enqueueing an id that is already Queued or
    /// Active for the same owner returns its current state unchanged.
    pub fn enqueue(
        &self,
        id: RequestId,
        owner: &Uid,
        hashes: Vec<ContentHash>,
        priority: bool,
    ) -> AppResult<RequestState> {
        let mut state = self.lock();
        if let Some(existing) = state.requests.get(&id) {
            if &existing.owner != owner {
                return Err(AppError::admission_rejected("Unknown request"));
            }
            debug!(request_id = %id, state = %existing.state, "Duplicate enqueue ignored");
            return Ok(existing.state);
        }

        let mut seen = HashSet::new();
        let hashes: Vec<ContentHash> = hashes
            .into_iter()
            .filter(|hash| seen.insert(hash.clone()))
            .collect();
        let lane = Lane::from_priority(priority);
        let file_count = hashes.len();
        state.requests.insert(
            id,
            DownloadRequest {
                id,
                owner: owner.clone(),
                hashes,
                lane,
                state: RequestState::Queued,
                enqueued_at: Utc::now(),
                activated_at: None,
                activation: 0,
            },
        );
        state.lane_queue(lane).push_back(id);
        drop(state);

        debug!(request_id = %id, %owner, ?lane, files = file_count, "Request enqueued");
        self.changed.notify_one();
        Ok(RequestState::Queued)
    }

    /// Withdraw a Queued request or release an Active one.
    pub fn cancel(&self, id: &RequestId, owner: &Uid) -> AppResult<RequestState> {
        let mut state = self.lock();
        let previous = owned_state(&state, id, owner)?;
        state.retire(id, RequestState::Cancelled);
        drop(state);

        info!(request_id = %id, %owner, from = %previous, "Request cancelled");
        self.changed.notify_one();
        Ok(previous)
    }

    /// Current state of an owned request.
    pub fn state_of(&self, id: &RequestId, owner: &Uid) -> AppResult<RequestState> {
        owned_state(&self.lock(), id, owner)
    }

    /// State of a request, re-enqueueing it under the same id when it fell
    /// out of the queue and the caller supplied its hashes again.
    pub fn check(
        &self,
        id: RequestId,
        owner: &Uid,
        hashes: Option<Vec<ContentHash>>,
        priority: bool,
    ) -> AppResult<RequestState> {
        match self.state_of(&id, owner) {
            Ok(state) => Ok(state),
            Err(err) => match hashes {
                Some(hashes) if !hashes.is_empty() => {
                    info!(request_id = %id, %owner, "Re-enqueueing request");
                    self.enqueue(id, owner, hashes, priority)
                }
                _ => Err(err),
            },
        }
    }

    /// Start pulling an Active request.
    pub fn begin_pull(&self, id: &RequestId, owner: &Uid) -> AppResult<PullTicket> {
        let state = self.lock();
        match state.requests.get(id) {
            Some(request) if &request.owner == owner && request.state == RequestState::Active => {
                Ok(PullTicket {
                    request_id: *id,
                    owner: owner.clone(),
                    hashes: request.hashes.clone(),
                    activation: request.activation,
                })
            }
            _ => Err(AppError::admission_rejected("Request is not ready")),
        }
    }

    /// Mark the activation behind `ticket` Completed and free its slot.
    /// Returns `false` when the request was cancelled or re-activated
    /// meanwhile.
    pub fn finish(&self, ticket: &PullTicket) -> bool {
        let mut state = self.lock();
        let current = state
            .requests
            .get(&ticket.request_id)
            .is_some_and(|r| r.activation == ticket.activation && r.state == RequestState::Active);
        if !current {
            return false;
        }
        state.retire(&ticket.request_id, RequestState::Completed);
        drop(state);

        debug!(request_id = %ticket.request_id, "Request completed");
        self.changed.notify_one();
        true
    }

    /// Drop every request of `owner`, e.g. when their session ends.
    pub fn cancel_all_of(&self, owner: &Uid) -> usize {
        let mut state = self.lock();
        let ids: Vec<RequestId> = state
            .requests
            .values()
            .filter(|r| &r.owner == owner)
            .map(|r| r.id)
            .collect();
        for id in &ids {
            state.retire(id, RequestState::Cancelled);
        }
        drop(state);

        if !ids.is_empty() {
            info!(%owner, count = ids.len(), "Dropped requests of departed owner");
            self.changed.notify_one();
        }
        ids.len()
    }

    /// Move Queued requests to Active while slots remain. The priority lane
    /// is served first; each lane is first-in first-out. Returns the
    /// activated `(owner, request)` pairs in activation order.
    pub fn promote(&self) -> Vec<(Uid, RequestId)> {
        let mut state = self.lock();
        let mut activated = Vec::new();
        loop {
            let lane = if state.active_priority < self.limits.priority_lane
                && !state.priority.is_empty()
            {
                Lane::Priority
            } else if state.active_normal < self.limits.normal_slots() && !state.normal.is_empty() {
                Lane::Normal
            } else {
                break;
            };

            let Some(id) = state.lane_queue(lane).pop_front() else {
                break;
            };
            state.next_activation += 1;
            let serial = state.next_activation;
            let Some(request) = state.requests.get_mut(&id) else {
                continue;
            };
            if !request.state.can_transition_to(RequestState::Active) {
                continue;
            }
            request.state = RequestState::Active;
            request.activated_at = Some(Utc::now());
            request.activation = serial;
            let owner = request.owner.clone();
            match lane {
                Lane::Normal => state.active_normal += 1,
                Lane::Priority => state.active_priority += 1,
            }
            activated.push((owner, id));
        }
        activated
    }

    /// Resolves after the next mutation that may allow promotion.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            queued_normal: state.normal.len(),
            queued_priority: state.priority.len(),
            active_normal: state.active_normal,
            active_priority: state.active_priority,
            max_active: self.limits.max_active,
            priority_lane: self.limits.priority_lane,
            completed_total: state.completed_total,
            cancelled_total: state.cancelled_total,
        }
    }

    /// Snapshot of one request, for diagnostics.
    pub fn get(&self, id: &RequestId) -> Option<DownloadRequest> {
        self.lock().requests.get(id).cloned()
    }
}

fn owned_state(state: &QueueState, id: &RequestId, owner: &Uid) -> AppResult<RequestState> {
    match state.requests.get(id) {
        Some(request) if &request.owner == owner => Ok(request.state),
        _ => Err(AppError::admission_rejected("Unknown request")),
    }
}

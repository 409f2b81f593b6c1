//! Cross-context synchronizer.
//!
//! Wraps a [`SessionStore`] and keeps it eventually consistent with every
//! other context on the same channel. Local mutations are applied to the
//! store and then published; remote mutations are applied only when their
//! timestamp is strictly newer than the local `updatedAt` (last write wins),
//! through the same store paths a local caller uses, so subscribers cannot
//! tell the two apart.

use std::collections::{HashMap, VecDeque};

use payment_types::{
    PaymentSession, PaymentStatus, SessionError, SessionId, StatusDetails, TimestampMs,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::{ResyncRequest, StatusDelta, SyncChannel, SyncMessage};
use crate::config::SyncConfig;
use crate::store::{SessionStore, StoreOutcome};

/// What happened to one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote change was applied to the local store.
    Applied(PaymentSession),
    /// The remote delete removed the local copy.
    Deleted(SessionId),
    /// The local copy is as new or newer; discarded.
    Stale {
        id: SessionId,
        local: TimestampMs,
        incoming: TimestampMs,
    },
    /// Newer, but would break the state machine or an invariant.
    Rejected { id: SessionId, reason: SessionError },
    /// Nothing to apply it to.
    Ignored { id: SessionId },
    /// Peers were sent this many sessions in answer to a resync request.
    Resynced(usize),
    /// Not a message this synchronizer understands.
    Dropped,
}

/// Counters for messages seen by a synchronizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Messages sent to peers.
    pub published: u64,
    /// Remote updates and deletes applied locally.
    pub applied: u64,
    /// Remote messages older than local state.
    pub stale: u64,
    /// Remote messages that broke an invariant or came from too far ahead.
    pub rejected: u64,
    /// Remote messages for sessions not held locally.
    pub ignored: u64,
    /// Unparseable or unknown messages.
    pub dropped: u64,
}

/// Deleted-session markers, oldest first.
#[derive(Debug, Default)]
struct Tombstones {
    deleted_at: HashMap<SessionId, TimestampMs>,
    order: VecDeque<SessionId>,
    capacity: usize,
}

impl Tombstones {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    fn record(&mut self, id: SessionId, at: TimestampMs) {
        if self.capacity == 0 {
            return;
        }
        match self.deleted_at.get_mut(&id) {
            Some(existing) => *existing = (*existing).max(at),
            None => {
                if self.order.len() >= self.capacity {
                    if let Some(oldest) = self.order.pop_front() {
                        self.deleted_at.remove(&oldest);
                    }
                }
                self.deleted_at.insert(id.clone(), at);
                self.order.push_back(id);
            }
        }
    }

    fn get(&self, id: &SessionId) -> Option<TimestampMs> {
        self.deleted_at.get(id).copied()
    }

    fn forget(&mut self, id: &SessionId) {
        if self.deleted_at.remove(id).is_some() {
            self.order.retain(|i| i != id);
        }
    }

    fn clear(&mut self) {
        self.deleted_at.clear();
        self.order.clear();
    }
}

/// Keeps one context's session store in step with its peers.
pub struct SessionSynchronizer {
    context_id: String,
    store: SessionStore,
    channel: Box<dyn SyncChannel>,
    tombstones: Tombstones,
    max_clock_skew_ms: i64,
    stats: SyncStats,
}

impl SessionSynchronizer {
    /// Wrap `store` and start listening on `channel`.
    ///
    /// Publishes a resync request when `resync_on_connect` is set.
    pub fn new(store: SessionStore, channel: Box<dyn SyncChannel>, config: SyncConfig) -> Self {
        let mut sync = Self {
            context_id: uuid::Uuid::new_v4().to_string(),
            store,
            channel,
            tombstones: Tombstones::new(config.max_tombstones),
            max_clock_skew_ms: config.max_clock_skew_ms,
            stats: SyncStats::default(),
        };
        info!(
            context_id = %sync.context_id,
            channel = sync.channel.name(),
            "Session synchronizer connected"
        );
        if config.resync_on_connect {
            sync.request_resync();
        }
        sync
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    // ── Local mutations ────────────────────────────────────────────────

    pub fn update_session(&mut self, session: PaymentSession) -> StoreOutcome {
        let outcome = self.store.update_session(session);
        if let StoreOutcome::Applied(stored) = &outcome {
            self.tombstones.forget(&stored.id);
            self.publish(SyncMessage::session_update(stored.clone()));
        }
        outcome
    }

    pub fn update_status(&mut self, id: &SessionId, status: PaymentStatus) -> StoreOutcome {
        self.update_status_with(id, status, StatusDetails::default())
    }

    pub fn update_status_with(
        &mut self,
        id: &SessionId,
        status: PaymentStatus,
        details: StatusDetails,
    ) -> StoreOutcome {
        let outcome = self.store.update_status_with(id, status, details);
        if let StoreOutcome::Applied(stored) = &outcome {
            self.publish(SyncMessage::status_update(stored));
        }
        outcome
    }

    pub fn retry(&mut self, id: &SessionId) -> StoreOutcome {
        let before = self.store.get_session(id).map(|s| s.status);
        let outcome = self.store.retry(id);
        if let StoreOutcome::Applied(stored) = &outcome {
            let message = if before == Some(stored.status) {
                SyncMessage::session_update(stored.clone())
            } else {
                SyncMessage::status_update(stored)
            };
            self.publish(message);
        }
        outcome
    }

    pub fn expire_pending(&mut self) -> Vec<StoreOutcome> {
        let outcomes = self.store.expire_pending();
        for outcome in &outcomes {
            if let StoreOutcome::Applied(stored) = outcome {
                self.publish(SyncMessage::status_update(stored));
            }
        }
        outcomes
    }

    pub fn delete_session(&mut self, id: &SessionId) -> StoreOutcome {
        let at = match self.store.get_session(id) {
            Some(existing) => self.store.stamp_after(existing),
            None => return self.store.delete_session(id),
        };
        let outcome = self.store.delete_session(id);
        if outcome.is_applied() {
            self.tombstones.record(id.clone(), at);
            self.publish(SyncMessage::SessionDelete {
                payload: id.clone(),
                timestamp: at,
            });
        }
        outcome
    }

    pub fn get_session(&self, id: &SessionId) -> Option<&PaymentSession> {
        self.store.get_session(id)
    }

    /// Ask every peer to republish its live sessions.
    pub fn request_resync(&mut self) {
        let message = SyncMessage::SyncRequest {
            payload: ResyncRequest {
                context_id: self.context_id.clone(),
            },
            timestamp: self.store.now(),
        };
        self.publish(message);
    }

    fn publish(&mut self, message: SyncMessage) {
        if self.channel.is_closed() {
            debug!(message_type = message.type_name(), "Sync channel closed, not publishing");
            return;
        }
        match self.channel.publish(&message) {
            Ok(()) => self.stats.published += 1,
            Err(e) => {
                warn!(message_type = message.type_name(), error = %e, "Failed to publish sync message")
            }
        }
    }

    // ── Remote mutations ───────────────────────────────────────────────

    /// Apply every message waiting on the channel, without blocking.
    pub fn pump(&mut self) -> Vec<SyncOutcome> {
        let mut outcomes = Vec::new();
        while let Some(raw) = self.channel.try_recv() {
            outcomes.push(self.handle_raw(&raw));
        }
        outcomes
    }

    /// Wait for the next message and apply it. `None` once closed.
    pub async fn next_remote(&mut self) -> Option<SyncOutcome> {
        let raw = self.channel.recv().await?;
        Some(self.handle_raw(&raw))
    }

    /// Apply one raw message as received from the channel.
    ///
    /// Malformed or foreign-shaped input is dropped.
    pub fn handle_raw(&mut self, raw: &str) -> SyncOutcome {
        match SyncMessage::from_json(raw) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                debug!(error = %e, "Dropping unrecognized sync message");
                self.stats.dropped += 1;
                SyncOutcome::Dropped
            }
        }
    }

    /// Apply one decoded message from another context.
    pub fn handle_message(&mut self, message: SyncMessage) -> SyncOutcome {
        debug!(
            message_type = message.type_name(),
            timestamp = message.timestamp(),
            "Applying sync message"
        );
        if let Some(rejected) = self.reject_if_ahead(&message) {
            self.stats.rejected += 1;
            return rejected;
        }

        let outcome = match message {
            SyncMessage::SessionUpdate { payload, timestamp } => {
                self.apply_session(payload, timestamp)
            }
            SyncMessage::StatusUpdate { payload, timestamp } => {
                self.apply_status(payload, timestamp)
            }
            SyncMessage::SessionDelete { payload, timestamp } => {
                self.apply_delete(payload, timestamp)
            }
            SyncMessage::SyncRequest { payload, .. } => self.answer_resync(payload),
        };

        match &outcome {
            SyncOutcome::Applied(_) | SyncOutcome::Deleted(_) => self.stats.applied += 1,
            SyncOutcome::Stale { id, local, incoming } => {
                debug!(session_id = %id, local, incoming, "Discarding stale sync message");
                self.stats.stale += 1;
            }
            SyncOutcome::Rejected { .. } => self.stats.rejected += 1,
            SyncOutcome::Ignored { .. } => self.stats.ignored += 1,
            SyncOutcome::Dropped => self.stats.dropped += 1,
            SyncOutcome::Resynced(_) => {}
        }
        outcome
    }

    /// Reject a mutation stamped implausibly far past the local clock, so it
    /// cannot pin a session or tombstone at the end of time.
    fn reject_if_ahead(&self, message: &SyncMessage) -> Option<SyncOutcome> {
        let id = match message {
            SyncMessage::SessionUpdate { payload, .. } => &payload.id,
            SyncMessage::StatusUpdate { payload, .. } => &payload.session_id,
            SyncMessage::SessionDelete { payload, .. } => payload,
            SyncMessage::SyncRequest { .. } => return None,
        };
        let timestamp = message.timestamp();
        let now = self.store.now();
        if timestamp <= now.saturating_add(self.max_clock_skew_ms) {
            return None;
        }

        warn!(session_id = %id, timestamp, now, "Rejected sync message from the future");
        Some(SyncOutcome::Rejected {
            id: id.clone(),
            reason: SessionError::TimestampAhead {
                id: id.clone(),
                timestamp,
                now,
            },
        })
    }

    /// Newest local knowledge of `id`: its `updatedAt`, or its deletion time.
    fn local_version(&self, id: &SessionId) -> Option<TimestampMs> {
        let live = self.store.get_session(id).map(|s| s.updated_at);
        live.max(self.tombstones.get(id))
    }

    fn apply_session(&mut self, mut session: PaymentSession, timestamp: TimestampMs) -> SyncOutcome {
        session.updated_at = timestamp;
        if let Some(local) = self.local_version(&session.id) {
            if timestamp <= local {
                return SyncOutcome::Stale {
                    id: session.id,
                    local,
                    incoming: timestamp,
                };
            }
        }

        let id = session.id.clone();
        store_to_sync(self.store.put_session(session), || {
            self.tombstones.forget(&id);
        })
    }

    fn apply_status(&mut self, delta: StatusDelta, timestamp: TimestampMs) -> SyncOutcome {
        let Some(local) = self.store.get_session(&delta.session_id).map(|s| s.updated_at) else {
            return SyncOutcome::Ignored {
                id: delta.session_id,
            };
        };
        if timestamp <= local {
            return SyncOutcome::Stale {
                id: delta.session_id,
                local,
                incoming: timestamp,
            };
        }

        let details = delta.details();
        store_to_sync(
            self.store
                .set_status_at(&delta.session_id, delta.status, details, timestamp),
            || {},
        )
    }

    fn apply_delete(&mut self, id: SessionId, timestamp: TimestampMs) -> SyncOutcome {
        let local = self.store.get_session(&id).map(|s| s.updated_at);
        self.tombstones.record(id.clone(), timestamp);

        match local {
            None => SyncOutcome::Ignored { id },
            Some(local) if local > timestamp => SyncOutcome::Stale {
                id,
                local,
                incoming: timestamp,
            },
            Some(_) => {
                self.store.delete_session(&id);
                SyncOutcome::Deleted(id)
            }
        }
    }

    fn answer_resync(&mut self, request: ResyncRequest) -> SyncOutcome {
        if request.context_id == self.context_id {
            return SyncOutcome::Resynced(0);
        }
        let sessions = self.store.sessions();
        let count = sessions.len();
        for session in sessions {
            self.publish(SyncMessage::session_update(session));
        }
        debug!(requester = %request.context_id, count, "Answered resync request");
        SyncOutcome::Resynced(count)
    }

    // ── Teardown ───────────────────────────────────────────────────────

    /// Close the channel and clear local state. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        let was_open = !self.channel.is_closed();
        self.channel.close();
        self.store.clear();
        self.tombstones.clear();
        if was_open {
            info!(context_id = %self.context_id, "Session synchronizer cleaned up");
        }
    }
}

fn store_to_sync(outcome: StoreOutcome, on_applied: impl FnOnce()) -> SyncOutcome {
    match outcome {
        StoreOutcome::Applied(session) => {
            on_applied();
            SyncOutcome::Applied(session)
        }
        StoreOutcome::Deleted(session) => SyncOutcome::Deleted(session.id),
        StoreOutcome::NotFound(id) => SyncOutcome::Ignored { id },
        StoreOutcome::Rejected { id, reason } => SyncOutcome::Rejected { id, reason },
    }
}

impl std::fmt::Debug for SessionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSynchronizer")
            .field("context_id", &self.context_id)
            .field("channel", &self.channel.name())
            .field("closed", &self.channel.is_closed())
            .field("store", &self.store)
            .field("stats", &self.stats)
            .finish()
    }
}

//! In-memory session store.
//!
//! Sole authority for the local view of live payment sessions in one
//! context. Favors availability over strictness: unknown ids and illegal
//! transitions are reported as [`StoreOutcome`] values and logged, never
//! raised, since the blockchain is the record of truth.

use std::collections::HashMap;
use std::sync::Arc;

use payment_types::{
    Clock, PaymentSession, PaymentStatus, SessionError, SessionId, StatusDetails, TimestampMs,
};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, SessionEvent};
use crate::config::SessionConfig;

/// Failure reason attached when the retry limit fails a session.
pub const RETRY_LIMIT_EXCEEDED: &str = "Retry limit exceeded";

/// Failure reason attached when a pending session times out.
pub const PENDING_TIMEOUT: &str = "Payment timed out";

/// Result of a store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The session was stored; carries the stored copy.
    Applied(PaymentSession),
    /// The session was removed; carries the removed copy.
    Deleted(PaymentSession),
    /// No session with this id.
    NotFound(SessionId),
    /// The mutation would break an invariant and was dropped.
    Rejected { id: SessionId, reason: SessionError },
}

impl StoreOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StoreOutcome::Applied(_) | StoreOutcome::Deleted(_))
    }

    pub fn session(&self) -> Option<&PaymentSession> {
        match self {
            StoreOutcome::Applied(s) | StoreOutcome::Deleted(s) => Some(s),
            _ => None,
        }
    }
}

/// Keyed collection of live payment sessions.
pub struct SessionStore {
    sessions: HashMap<SessionId, PaymentSession>,
    current: Option<SessionId>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(bus: EventBus, clock: Arc<dyn Clock>, config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            current: None,
            bus,
            clock,
            config,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn now(&self) -> TimestampMs {
        self.clock.now_millis()
    }

    /// Timestamp for a local write that must order after `previous`.
    ///
    /// Never earlier than the session's creation, and strictly after its
    /// last mutation even when the clock has not moved.
    pub fn stamp_after(&self, previous: &PaymentSession) -> TimestampMs {
        self.now()
            .max(previous.updated_at.saturating_add(1))
            .max(previous.created_at)
    }

    /// Upsert a session on behalf of a local caller and stamp `updatedAt`.
    pub fn update_session(&mut self, mut session: PaymentSession) -> StoreOutcome {
        session.updated_at = match self.sessions.get(&session.id) {
            Some(previous) => self.stamp_after(previous),
            None => self.now().max(session.created_at),
        };
        self.put_session(session)
    }

    /// Store a session as given (its `updatedAt` is kept) and emit
    /// `sessionUpdated`.
    pub(crate) fn put_session(&mut self, session: PaymentSession) -> StoreOutcome {
        let check = match self.sessions.get(&session.id) {
            Some(previous) => previous.check_replacement(&session),
            None => session.validate(),
        };
        if let Err(reason) = check {
            warn!(session_id = %session.id, error = %reason, "Rejected session update");
            return StoreOutcome::Rejected {
                id: session.id,
                reason,
            };
        }

        self.current = Some(session.id.clone());
        self.sessions.insert(session.id.clone(), session.clone());
        debug!(
            session_id = %session.id,
            status = %session.status,
            updated_at = session.updated_at,
            "Session stored"
        );

        self.bus.emit(&SessionEvent::SessionUpdated(session.clone()));
        StoreOutcome::Applied(session)
    }

    /// Move a session to `status` on behalf of a local caller.
    pub fn update_status(&mut self, id: &SessionId, status: PaymentStatus) -> StoreOutcome {
        self.update_status_with(id, status, StatusDetails::default())
    }

    /// [`update_status`](Self::update_status), also attaching a transaction
    /// hash or failure reason.
    pub fn update_status_with(
        &mut self,
        id: &SessionId,
        status: PaymentStatus,
        details: StatusDetails,
    ) -> StoreOutcome {
        let at = match self.sessions.get(id) {
            Some(previous) => self.stamp_after(previous),
            None => {
                debug!(session_id = %id, "Status update for unknown session ignored");
                return StoreOutcome::NotFound(id.clone());
            }
        };
        self.set_status_at(id, status, details, at)
    }

    /// Change `status`, `updatedAt` and the given settlement details, then
    /// emit `statusUpdated`.
    pub(crate) fn set_status_at(
        &mut self,
        id: &SessionId,
        status: PaymentStatus,
        details: StatusDetails,
        at: TimestampMs,
    ) -> StoreOutcome {
        let Some(session) = self.sessions.get_mut(id) else {
            debug!(session_id = %id, "Status update for unknown session ignored");
            return StoreOutcome::NotFound(id.clone());
        };

        if let Err(source) = session.status.transition(status) {
            warn!(session_id = %id, error = %source, "Rejected status transition");
            return StoreOutcome::Rejected {
                id: id.clone(),
                reason: SessionError::Transition {
                    id: id.clone(),
                    source,
                },
            };
        }

        session.status = status;
        session.attach(details);
        session.updated_at = at.max(session.created_at);
        let updated = session.clone();
        info!(session_id = %id, status = %status, "Session status updated");

        self.bus.emit(&SessionEvent::StatusUpdated(updated.clone()));
        StoreOutcome::Applied(updated)
    }

    /// Record a processing retry.
    ///
    /// A `PENDING` session has its `retryCount` incremented and stays
    /// `PENDING`; once `max_retries` is reached the session is failed instead.
    pub fn retry(&mut self, id: &SessionId) -> StoreOutcome {
        let Some(current) = self.sessions.get(id) else {
            debug!(session_id = %id, "Retry for unknown session ignored");
            return StoreOutcome::NotFound(id.clone());
        };
        let at = self.stamp_after(current);

        if current.retry_count >= self.config.max_retries {
            info!(
                session_id = %id,
                retries = current.retry_count,
                "Retry limit exceeded, failing session"
            );
            return self.set_status_at(
                id,
                PaymentStatus::Failed,
                StatusDetails::failed(RETRY_LIMIT_EXCEEDED),
                at,
            );
        }

        let mut next = current.clone();
        next.retry_count += 1;
        next.status = PaymentStatus::Pending;
        next.updated_at = at;
        self.put_session(next)
    }

    /// Fail every `PENDING` session older than `pending_timeout_ms`.
    pub fn expire_pending(&mut self) -> Vec<StoreOutcome> {
        let now = self.now();
        let timeout = self.config.pending_timeout_ms;
        let mut expired: Vec<&PaymentSession> = self
            .sessions
            .values()
            .filter(|s| {
                s.status == PaymentStatus::Pending && now.saturating_sub(s.created_at) >= timeout
            })
            .collect();
        expired.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let ids: Vec<SessionId> = expired.into_iter().map(|s| s.id.clone()).collect();

        ids.iter()
            .map(|id| {
                self.update_status_with(
                    id,
                    PaymentStatus::Failed,
                    StatusDetails::failed(PENDING_TIMEOUT),
                )
            })
            .collect()
    }

    pub fn get_session(&self, id: &SessionId) -> Option<&PaymentSession> {
        self.sessions.get(id)
    }

    /// The session most recently stored through an upsert.
    pub fn current_session(&self) -> Option<&PaymentSession> {
        self.current.as_ref().and_then(|id| self.sessions.get(id))
    }

    /// Remove a session and emit `sessionDeleted`.
    pub fn delete_session(&mut self, id: &SessionId) -> StoreOutcome {
        match self.sessions.remove(id) {
            Some(removed) => {
                if self.current.as_ref() == Some(id) {
                    self.current = None;
                }
                info!(session_id = %id, "Session deleted");
                self.bus.emit(&SessionEvent::SessionDeleted(id.clone()));
                StoreOutcome::Deleted(removed)
            }
            None => {
                debug!(session_id = %id, "Delete for unknown session ignored");
                StoreOutcome::NotFound(id.clone())
            }
        }
    }

    /// Snapshot of all sessions, oldest first.
    pub fn sessions(&self) -> Vec<PaymentSession> {
        let mut all: Vec<PaymentSession> = self.sessions.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session without emitting events.
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.current = None;
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("current", &self.current)
            .finish()
    }
}

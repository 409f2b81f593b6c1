//! Cross-context broadcast channel.
//!
//! [`SyncMessage`] is the JSON wire format shared by every context on a
//! channel. [`SyncChannel`] is the narrow seam the synchronizer talks to;
//! [`BroadcastHub`] is an in-process implementation where each context
//! holds a [`HubPort`] on a named channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use payment_types::{PaymentSession, PaymentStatus, SessionId, StatusDetails, TimestampMs};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{ChannelError, SyncError};

/// Message exchanged between contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    /// Full session upsert.
    SessionUpdate {
        payload: PaymentSession,
        timestamp: TimestampMs,
    },
    /// Status-only change.
    StatusUpdate {
        payload: StatusDelta,
        timestamp: TimestampMs,
    },
    /// Session removal.
    SessionDelete {
        payload: SessionId,
        timestamp: TimestampMs,
    },
    /// Ask peers to republish their live sessions.
    SyncRequest {
        payload: ResyncRequest,
        timestamp: TimestampMs,
    },
}

/// Payload of a `STATUS_UPDATE`: the new status and any settlement details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDelta {
    pub session_id: SessionId,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusDelta {
    pub fn new(session_id: SessionId, status: PaymentStatus) -> Self {
        Self {
            session_id,
            status,
            tx_hash: None,
            error: None,
        }
    }

    pub fn details(&self) -> StatusDetails {
        StatusDetails {
            tx_hash: self.tx_hash.clone(),
            error: self.error.clone(),
        }
    }
}

/// Payload of a `SYNC_REQUEST`: which context is asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncRequest {
    pub context_id: String,
}

impl SyncMessage {
    pub fn session_update(session: PaymentSession) -> Self {
        let timestamp = session.updated_at;
        SyncMessage::SessionUpdate {
            payload: session,
            timestamp,
        }
    }

    pub fn status_update(session: &PaymentSession) -> Self {
        SyncMessage::StatusUpdate {
            payload: StatusDelta {
                session_id: session.id.clone(),
                status: session.status,
                tx_hash: session.tx_hash.clone(),
                error: session.error.clone(),
            },
            timestamp: session.updated_at,
        }
    }

    pub fn timestamp(&self) -> TimestampMs {
        match self {
            SyncMessage::SessionUpdate { timestamp, .. }
            | SyncMessage::StatusUpdate { timestamp, .. }
            | SyncMessage::SessionDelete { timestamp, .. }
            | SyncMessage::SyncRequest { timestamp, .. } => *timestamp,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SyncMessage::SessionUpdate { .. } => "SESSION_UPDATE",
            SyncMessage::StatusUpdate { .. } => "STATUS_UPDATE",
            SyncMessage::SessionDelete { .. } => "SESSION_DELETE",
            SyncMessage::SyncRequest { .. } => "SYNC_REQUEST",
        }
    }

    pub fn to_json(&self) -> Result<String, ChannelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, SyncError> {
        serde_json::from_str(raw).map_err(SyncError::Malformed)
    }
}

/// Named, best-effort broadcast channel shared by every context.
///
/// Implementations never deliver a message back to the port that
/// published it, and hand out raw text so malformed input can be
/// dropped by the receiver.
#[async_trait]
pub trait SyncChannel: Send {
    /// Channel name.
    fn name(&self) -> &str;

    /// Publish a message to every other participant.
    fn publish(&self, message: &SyncMessage) -> Result<(), ChannelError>;

    /// Next pending message, if any, without waiting.
    fn try_recv(&mut self) -> Option<String>;

    /// Wait for the next message. `None` once the channel is closed.
    async fn recv(&mut self) -> Option<String>;

    /// Stop sending and receiving. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: u64,
    text: Arc<str>,
}

struct HubInner {
    channels: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
    next_port: AtomicU64,
    capacity: usize,
}

/// In-process stand-in for an origin-scoped browser broadcast channel.
///
/// Every [`HubPort`] connected under the same name sees every message
/// published by the others. Clones share channels.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                channels: Mutex::new(HashMap::new()),
                next_port: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Join the channel called `name`, creating it on first use.
    pub fn connect(&self, name: &str) -> HubPort {
        let sender = self
            .inner
            .channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone();
        let receiver = sender.subscribe();
        let origin = self.inner.next_port.fetch_add(1, Ordering::Relaxed);
        debug!(channel = name, port = origin, "Connected to broadcast channel");

        HubPort {
            name: name.to_string(),
            origin,
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }

    /// Number of open ports on `name`.
    pub fn participants(&self, name: &str) -> usize {
        self.inner
            .channels
            .lock()
            .get(name)
            .map_or(0, |sender| sender.receiver_count())
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// One context's connection to a [`BroadcastHub`] channel.
pub struct HubPort {
    name: String,
    origin: u64,
    sender: Option<broadcast::Sender<Envelope>>,
    receiver: Option<broadcast::Receiver<Envelope>>,
}

impl HubPort {
    /// Publish raw text, bypassing message encoding.
    pub fn publish_raw(&self, text: &str) -> Result<(), ChannelError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ChannelError::Closed(self.name.clone()))?;
        // Ignore errors if no receivers
        let _ = sender.send(Envelope {
            origin: self.origin,
            text: Arc::from(text),
        });
        Ok(())
    }
}

#[async_trait]
impl SyncChannel for HubPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, message: &SyncMessage) -> Result<(), ChannelError> {
        self.publish_raw(&message.to_json()?)
    }

    fn try_recv(&mut self) -> Option<String> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.try_recv() {
                Ok(envelope) if envelope.origin == self.origin => continue,
                Ok(envelope) => return Some(envelope.text.to_string()),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(channel = %self.name, lagged = n, "Sync channel lagged, messages lost");
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
            }
        }
    }

    async fn recv(&mut self) -> Option<String> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(envelope) if envelope.origin == self.origin => continue,
                Ok(envelope) => return Some(envelope.text.to_string()),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(channel = %self.name, lagged = n, "Sync channel lagged, messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn close(&mut self) {
        let was_open = self.receiver.is_some();
        self.sender = None;
        self.receiver = None;
        if was_open {
            debug!(channel = %self.name, port = self.origin, "Broadcast port closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.receiver.is_none()
    }
}

impl std::fmt::Debug for HubPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubPort")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("closed", &self.is_closed())
            .finish()
    }
}

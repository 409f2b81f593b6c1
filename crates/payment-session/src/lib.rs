//! # payment-session
//!
//! Live payment session state for one context (browser tab, window, or any
//! other independent copy of the client), kept consistent with its peers.
//!
//! ## Components
//!
//! - [`SessionStore`]: keyed in-memory sessions, enforces the status state machine
//! - [`EventBus`]: synchronous `sessionUpdated` / `statusUpdated` / `sessionDeleted` fan-out
//! - [`SessionSynchronizer`]: publishes local mutations on a [`SyncChannel`] and
//!   applies remote ones with last-write-wins on `updatedAt`
//! - [`BroadcastHub`]: in-process named broadcast channel for contexts that share a process
//!
//! Data flows one way: mutation → store → synchronizer (fan-out) → event bus → subscribers.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use payment_session::{BroadcastHub, EventBus, SessionConfig, SessionStore, SessionSynchronizer, SyncConfig};
//! use payment_types::SystemClock;
//!
//! let hub = BroadcastHub::default();
//! let config = SyncConfig::default();
//! let store = SessionStore::new(EventBus::new(), Arc::new(SystemClock), SessionConfig::default());
//! let port = hub.connect(&config.channel_name);
//! let mut sync = SessionSynchronizer::new(store, Box::new(port), config);
//!
//! sync.pump();
//! sync.cleanup();
//! assert!(sync.is_closed());
//! ```

#![deny(unsafe_code)]

pub mod bus;
pub mod channel;
pub mod config;
pub mod error;
pub mod store;
pub mod sync;

pub use bus::{EventBus, EventHandler, SessionEvent, SessionEventKind, Subscription, SubscriptionId};
pub use channel::{BroadcastHub, HubPort, ResyncRequest, StatusDelta, SyncChannel, SyncMessage};
pub use config::{SessionConfig, SyncConfig};
pub use error::{ChannelError, Result, SyncError};
pub use store::{SessionStore, StoreOutcome, PENDING_TIMEOUT, RETRY_LIMIT_EXCEEDED};
pub use sync::{SessionSynchronizer, SyncOutcome, SyncStats};

//! # payment-types
//!
//! Shared data model for the payment session subsystem:
//!
//! - [`PaymentSession`]: one payment attempt, from creation to on-chain outcome
//! - [`PaymentStatus`]: `PENDING → CONFIRMED | FAILED`, with terminal states
//! - [`PaymentNetwork`] / [`PaymentToken`]: the chain and asset a session pays with
//! - [`Clock`]: millisecond wall-clock source used to stamp `updatedAt`
//!
//! Wire shapes are camelCase JSON so sessions can be exchanged with browser
//! contexts verbatim.

#![deny(unsafe_code)]

pub mod clock;
pub mod error;
pub mod ids;
pub mod network;
pub mod session;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SessionError, TransitionError};
pub use ids::SessionId;
pub use network::PaymentNetwork;
pub use session::{PaymentSession, PaymentToken, StatusDetails};
pub use status::PaymentStatus;

/// Millisecond timestamp since the Unix epoch.
pub type TimestampMs = i64;

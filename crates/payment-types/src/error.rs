use thiserror::Error;

use crate::ids::SessionId;
use crate::network::PaymentNetwork;
use crate::status::PaymentStatus;
use crate::TimestampMs;

/// A status change the state machine does not allow.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
}

/// A session that violates the data-model invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {id}: updatedAt {updated_at} precedes createdAt {created_at}")]
    UpdatedBeforeCreated {
        id: SessionId,
        created_at: TimestampMs,
        updated_at: TimestampMs,
    },

    #[error("session {id}: network {network} does not match token network {token_network}")]
    NetworkMismatch {
        id: SessionId,
        network: PaymentNetwork,
        token_network: PaymentNetwork,
    },

    #[error("session {id}: immutable field `{field}` changed")]
    ImmutableField { id: SessionId, field: &'static str },

    #[error("session {id}: retryCount decreased from {previous} to {next}")]
    RetryCountDecreased {
        id: SessionId,
        previous: u32,
        next: u32,
    },

    #[error("session {id}: timestamp {timestamp} is too far ahead of local time {now}")]
    TimestampAhead {
        id: SessionId,
        timestamp: TimestampMs,
        now: TimestampMs,
    },

    #[error("session {id}: {source}")]
    Transition {
        id: SessionId,
        #[source]
        source: TransitionError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_display() {
        let err = TransitionError {
            from: PaymentStatus::Confirmed,
            to: PaymentStatus::Pending,
        };
        assert_eq!(err.to_string(), "illegal status transition CONFIRMED -> PENDING");
    }

    #[test]
    fn session_error_names_the_session() {
        let err = SessionError::ImmutableField {
            id: SessionId::new("abc"),
            field: "token",
        };
        let s = err.to_string();
        assert!(s.contains("abc"));
        assert!(s.contains("token"));
    }
}

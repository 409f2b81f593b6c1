//! Payment sessions and the tokens they pay with.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::ids::SessionId;
use crate::network::PaymentNetwork;
use crate::status::PaymentStatus;
use crate::TimestampMs;

/// Asset used to pay for a session. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentToken {
    /// Contract or mint address on `network`.
    pub address: String,
    /// Ticker shown to the user.
    pub symbol: String,
    /// Decimal places of the on-chain unit.
    pub decimals: u8,
    /// Chain the token lives on.
    pub network: PaymentNetwork,
}

impl PaymentToken {
    pub fn new(
        address: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
        network: PaymentNetwork,
    ) -> Self {
        Self {
            address: address.into(),
            symbol: symbol.into(),
            decimals,
            network,
        }
    }
}

/// Settlement details attached alongside a status change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusDetails {
    pub tx_hash: Option<String>,
    pub error: Option<String>,
}

impl StatusDetails {
    pub fn confirmed(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: Some(tx_hash.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            tx_hash: None,
            error: Some(error.into()),
        }
    }
}

/// Tracked state of one payment attempt.
///
/// `updated_at` is the authority for cross-context conflict resolution and
/// is stamped by whichever context performs a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub id: SessionId,
    pub user_id: String,
    pub network: PaymentNetwork,
    pub token: PaymentToken,
    /// Amount in the token's display unit, carried as a decimal string.
    pub amount: Decimal,
    pub status: PaymentStatus,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
    /// On-chain transaction hash, attached on confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Failure reason, attached when the payment fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentSession {
    /// New `PENDING` session on the token's network.
    pub fn new(
        id: SessionId,
        user_id: impl Into<String>,
        token: PaymentToken,
        amount: Decimal,
        created_at: TimestampMs,
    ) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            network: token.network,
            token,
            amount,
            status: PaymentStatus::Pending,
            retry_count: 0,
            created_at,
            updated_at: created_at,
            tx_hash: None,
            error: None,
        }
    }

    /// Overwrite the settlement fields `details` carries; absent ones are kept.
    pub fn attach(&mut self, details: StatusDetails) {
        if let Some(tx_hash) = details.tx_hash {
            self.tx_hash = Some(tx_hash);
        }
        if let Some(error) = details.error {
            self.error = Some(error);
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Milliseconds between creation and the last mutation.
    pub fn processing_time_ms(&self) -> i64 {
        self.updated_at.saturating_sub(self.created_at)
    }

    /// Check the invariants every stored session must hold.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.updated_at < self.created_at {
            return Err(SessionError::UpdatedBeforeCreated {
                id: self.id.clone(),
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        if self.token.network != self.network {
            return Err(SessionError::NetworkMismatch {
                id: self.id.clone(),
                network: self.network,
                token_network: self.token.network,
            });
        }
        Ok(())
    }

    /// Check that `next` is an acceptable full replacement of `self`.
    ///
    /// Identity, ownership, network, token and creation time are fixed;
    /// `retry_count` only grows; a status change must be a legal transition.
    pub fn check_replacement(&self, next: &PaymentSession) -> Result<(), SessionError> {
        next.validate()?;

        let immutable = [
            ("id", self.id != next.id),
            ("userId", self.user_id != next.user_id),
            ("network", self.network != next.network),
            ("token", self.token != next.token),
            ("createdAt", self.created_at != next.created_at),
        ];
        if let Some((field, _)) = immutable.into_iter().find(|(_, changed)| *changed) {
            return Err(SessionError::ImmutableField {
                id: self.id.clone(),
                field,
            });
        }

        if next.retry_count < self.retry_count {
            return Err(SessionError::RetryCountDecreased {
                id: self.id.clone(),
                previous: self.retry_count,
                next: next.retry_count,
            });
        }

        if next.status != self.status {
            self.status
                .transition(next.status)
                .map_err(|source| SessionError::Transition {
                    id: self.id.clone(),
                    source,
                })?;
        }

        Ok(())
    }
}

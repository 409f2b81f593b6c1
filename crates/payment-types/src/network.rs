//! Supported payment networks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Blockchain a payment is made on.
///
/// Scopes both sessions and aggregated metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentNetwork {
    Ethereum,
    Polygon,
    Bsc,
    Solana,
}

impl PaymentNetwork {
    /// Every supported network, in reporting order.
    pub const ALL: [PaymentNetwork; 4] = [
        PaymentNetwork::Ethereum,
        PaymentNetwork::Polygon,
        PaymentNetwork::Bsc,
        PaymentNetwork::Solana,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentNetwork::Ethereum => "ETHEREUM",
            PaymentNetwork::Polygon => "POLYGON",
            PaymentNetwork::Bsc => "BSC",
            PaymentNetwork::Solana => "SOLANA",
        }
    }
}

impl fmt::Display for PaymentNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

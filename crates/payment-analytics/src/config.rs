//! Aggregator configuration.

use serde::{Deserialize, Serialize};

/// Sizing of the aggregator's history and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Tracked transactions kept for history queries. Oldest are evicted;
    /// metrics are unaffected by eviction.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Transactions included in a report's `recentTransactions`.
    #[serde(default = "default_recent_transactions_limit")]
    pub recent_transactions_limit: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            recent_transactions_limit: default_recent_transactions_limit(),
        }
    }
}

const fn default_history_capacity() -> usize {
    10_000
}

const fn default_recent_transactions_limit() -> usize {
    10
}

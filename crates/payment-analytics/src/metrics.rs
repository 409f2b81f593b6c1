//! Per-network metrics.

use payment_types::{PaymentSession, PaymentStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Point-in-time statistics for one network.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    /// Mean `retryCount` per tracked transaction.
    pub retry_rate: f64,
    /// Sum of tracked amounts, serialized as a decimal string.
    pub total_volume: Decimal,
    /// Mean `updatedAt - createdAt`, in milliseconds.
    pub average_processing_time: f64,
}

impl NetworkMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_transactions == 0 {
            0.0
        } else {
            self.successful_transactions as f64 / self.total_transactions as f64
        }
    }
}

/// Exact running sums; means are derived from them on every snapshot so
/// they never drift.
#[derive(Debug, Clone, Default)]
pub(crate) struct NetworkAccumulator {
    total: u64,
    successful: u64,
    failed: u64,
    retry_sum: u64,
    processing_sum: i128,
    volume: Decimal,
}

impl NetworkAccumulator {
    pub(crate) fn record(&mut self, session: &PaymentSession) {
        self.total += 1;
        match session.status {
            PaymentStatus::Confirmed => self.successful += 1,
            PaymentStatus::Failed => self.failed += 1,
            PaymentStatus::Pending => {}
        }
        self.retry_sum += u64::from(session.retry_count);
        self.processing_sum += i128::from(session.processing_time_ms());

        match self.volume.checked_add(session.amount) {
            Some(sum) => self.volume = sum,
            None => warn!(
                session_id = %session.id,
                amount = %session.amount,
                "Volume overflow, amount not added"
            ),
        }
    }

    pub(crate) fn snapshot(&self) -> NetworkMetrics {
        let mean = |sum: f64| {
            if self.total == 0 {
                0.0
            } else {
                sum / self.total as f64
            }
        };
        NetworkMetrics {
            total_transactions: self.total,
            successful_transactions: self.successful,
            failed_transactions: self.failed,
            retry_rate: mean(self.retry_sum as f64),
            total_volume: self.volume.normalize(),
            average_processing_time: mean(self.processing_sum as f64),
        }
    }
}

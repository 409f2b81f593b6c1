//! Analytics report shapes.

use std::collections::BTreeMap;

use payment_types::{PaymentNetwork, PaymentSession, TimestampMs};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::metrics::NetworkMetrics;

/// Serializable point-in-time snapshot for logging or export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub timestamp: TimestampMs,
    pub metrics: BTreeMap<PaymentNetwork, NetworkMetrics>,
    pub recent_transactions: Vec<PaymentSession>,
    pub summary: ReportSummary,
}

/// Totals across the networks in a report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    pub global_success_rate: f64,
    pub average_processing_time: f64,
    /// Exact sum of every reported network's volume.
    pub total_volume: Decimal,
}

impl ReportSummary {
    pub(crate) fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a NetworkMetrics>) -> Self {
        let mut summary = ReportSummary::default();
        let mut processing_total = 0.0;
        for m in metrics {
            summary.total_transactions += m.total_transactions;
            summary.successful_transactions += m.successful_transactions;
            summary.failed_transactions += m.failed_transactions;
            summary.total_volume = summary.total_volume.saturating_add(m.total_volume);
            processing_total += m.average_processing_time * m.total_transactions as f64;
        }
        if summary.total_transactions > 0 {
            let total = summary.total_transactions as f64;
            summary.global_success_rate = summary.successful_transactions as f64 / total;
            summary.average_processing_time = processing_total / total;
        }
        summary.total_volume = summary.total_volume.normalize();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn summary_volume_is_exact_across_networks() {
        let metrics = [
            NetworkMetrics {
                total_transactions: 1,
                total_volume: Decimal::from_str("0.1").unwrap(),
                ..Default::default()
            },
            NetworkMetrics {
                total_transactions: 1,
                total_volume: Decimal::from_str("0.2").unwrap(),
                ..Default::default()
            },
        ];
        let summary = ReportSummary::from_metrics(&metrics);
        assert_eq!(summary.total_volume.to_string(), "0.3");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totalVolume"], "0.3");
    }

    #[test]
    fn empty_summary_is_zero() {
        let summary = ReportSummary::from_metrics(std::iter::empty());
        assert_eq!(summary, ReportSummary::default());
        assert_eq!(summary.total_volume.to_string(), "0");
    }
}

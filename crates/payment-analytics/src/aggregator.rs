//! Analytics aggregator.
//!
//! One instance per context, shared by reference with every consumer
//! (dashboards, reports, the event-bus recorder). All methods take `&self`
//! and are safe to call concurrently.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use payment_types::{Clock, PaymentNetwork, PaymentSession, SessionId, SystemClock, TimestampMs};
use tracing::{debug, info};

use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::metrics::{NetworkAccumulator, NetworkMetrics};
use crate::report::{AnalyticsReport, ReportSummary};

/// History query. Omitted fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub network: Option<PaymentNetwork>,
    /// Inclusive lower bound on `createdAt`.
    pub since: Option<TimestampMs>,
    /// Inclusive upper bound on `createdAt`.
    pub until: Option<TimestampMs>,
}

impl HistoryFilter {
    pub fn network(network: PaymentNetwork) -> Self {
        Self {
            network: Some(network),
            ..Default::default()
        }
    }

    pub fn matches(&self, session: &PaymentSession) -> bool {
        self.network.map_or(true, |n| session.network == n)
            && self.since.map_or(true, |t| session.created_at >= t)
            && self.until.map_or(true, |t| session.created_at <= t)
    }
}

#[derive(Default)]
struct AnalyticsState {
    networks: HashMap<PaymentNetwork, NetworkAccumulator>,
    history: VecDeque<PaymentSession>,
    /// Sessions whose outcome has been recorded, oldest first.
    outcomes: HashSet<SessionId>,
    outcome_order: VecDeque<SessionId>,
}

/// Per-network payment statistics over tracked transactions.
pub struct PaymentAnalytics {
    config: AnalyticsConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<AnalyticsState>,
}

impl PaymentAnalytics {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AnalyticsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: RwLock::new(AnalyticsState::default()),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Append a transaction to the history and fold it into its network's
    /// metrics.
    pub fn track_transaction(&self, session: &PaymentSession) {
        let mut state = self.state.write();
        state
            .networks
            .entry(session.network)
            .or_default()
            .record(session);

        if self.config.history_capacity > 0 {
            if state.history.len() >= self.config.history_capacity {
                state.history.pop_front();
            }
            state.history.push_back(session.clone());
        }
        debug!(
            session_id = %session.id,
            network = %session.network,
            status = %session.status,
            "Transaction tracked"
        );
    }

    /// Track `session` unless its outcome was already recorded.
    ///
    /// Returns false for a repeat.
    pub fn record_outcome(&self, session: &PaymentSession) -> bool {
        {
            let mut state = self.state.write();
            if !state.outcomes.insert(session.id.clone()) {
                return false;
            }
            state.outcome_order.push_back(session.id.clone());
            let capacity = self.config.history_capacity.max(1);
            while state.outcome_order.len() > capacity {
                if let Some(oldest) = state.outcome_order.pop_front() {
                    state.outcomes.remove(&oldest);
                }
            }
        }
        self.track_transaction(session);
        true
    }

    /// Current metrics for `network`; zeroed when nothing was tracked.
    pub fn get_network_metrics(&self, network: PaymentNetwork) -> NetworkMetrics {
        self.state
            .read()
            .networks
            .get(&network)
            .map(NetworkAccumulator::snapshot)
            .unwrap_or_default()
    }

    /// Metrics for every supported network.
    pub fn all_metrics(&self) -> BTreeMap<PaymentNetwork, NetworkMetrics> {
        PaymentNetwork::ALL
            .into_iter()
            .map(|n| (n, self.get_network_metrics(n)))
            .collect()
    }

    /// Tracked transactions on `network` (if given) created at or after
    /// `since` (if given), in tracking order.
    pub fn get_transaction_history(
        &self,
        network: Option<PaymentNetwork>,
        since: Option<TimestampMs>,
    ) -> Vec<PaymentSession> {
        self.filter_history(&HistoryFilter {
            network,
            since,
            until: None,
        })
    }

    pub fn filter_history(&self, filter: &HistoryFilter) -> Vec<PaymentSession> {
        self.state
            .read()
            .history
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }

    /// Snapshot of metrics and recent transactions, scoped to `network` when
    /// given.
    pub fn generate_report(&self, network: Option<PaymentNetwork>) -> AnalyticsReport {
        let metrics: BTreeMap<PaymentNetwork, NetworkMetrics> = match network {
            Some(n) => BTreeMap::from([(n, self.get_network_metrics(n))]),
            None => self.all_metrics(),
        };

        let filter = network.map(HistoryFilter::network).unwrap_or_default();
        let matching = self.filter_history(&filter);
        let skip = matching
            .len()
            .saturating_sub(self.config.recent_transactions_limit);
        let recent_transactions = matching.into_iter().skip(skip).collect();

        AnalyticsReport {
            timestamp: self.clock.now_millis(),
            summary: ReportSummary::from_metrics(metrics.values()),
            metrics,
            recent_transactions,
        }
    }

    /// [`generate_report`](Self::generate_report) as JSON.
    pub fn report_json(&self, network: Option<PaymentNetwork>) -> Result<String> {
        Ok(serde_json::to_string(&self.generate_report(network))?)
    }

    /// Reset every network's counters and the history. Idempotent.
    pub fn clear_metrics(&self) {
        *self.state.write() = AnalyticsState::default();
        info!("Payment analytics cleared");
    }
}

impl Default for PaymentAnalytics {
    fn default() -> Self {
        Self::new(AnalyticsConfig::default())
    }
}

impl std::fmt::Debug for PaymentAnalytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentAnalytics")
            .field("config", &self.config)
            .field("history", &self.history_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payment_types::{ManualClock, PaymentStatus, PaymentToken};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const NOW: TimestampMs = 1_700_000_000_000;

    fn session(id: &str, network: PaymentNetwork, status: PaymentStatus) -> PaymentSession {
        let mut s = PaymentSession::new(
            SessionId::new(id),
            "test-user",
            PaymentToken::new("0x1234", "TEST", 18, network),
            Decimal::from_str("1.5").unwrap(),
            NOW - 1_000,
        );
        s.status = status;
        s.updated_at = NOW;
        s.retry_count = 1;
        s
    }

    fn analytics() -> PaymentAnalytics {
        PaymentAnalytics::with_clock(AnalyticsConfig::default(), Arc::new(ManualClock::new(NOW)))
    }

    #[test]
    fn tracks_success_and_failure() {
        let a = analytics();
        a.track_transaction(&session("s1", PaymentNetwork::Ethereum, PaymentStatus::Confirmed));
        a.track_transaction(&session("s2", PaymentNetwork::Ethereum, PaymentStatus::Failed));
        a.track_transaction(&session("s3", PaymentNetwork::Ethereum, PaymentStatus::Pending));

        let m = a.get_network_metrics(PaymentNetwork::Ethereum);
        assert_eq!(m.total_transactions, 3);
        assert_eq!(m.successful_transactions, 1);
        assert_eq!(m.failed_transactions, 1);
    }

    #[test]
    fn retry_rate_is_mean_retry_count() {
        let a = analytics();
        a.track_transaction(&session("s1", PaymentNetwork::Ethereum, PaymentStatus::Confirmed));
        let mut second = session("s2", PaymentNetwork::Ethereum, PaymentStatus::Confirmed);
        second.retry_count = 2;
        a.track_transaction(&second);

        assert_eq!(a.get_network_metrics(PaymentNetwork::Ethereum).retry_rate, 1.5);
    }

    #[test]
    fn volume_is_decimal_exact() {
        let a = analytics();
        a.track_transaction(&session("s1", PaymentNetwork::Ethereum, PaymentStatus::Confirmed));
        let mut second = session("s2", PaymentNetwork::Ethereum, PaymentStatus::Confirmed);
        second.amount = Decimal::from_str("2.5").unwrap();
        a.track_transaction(&second);

        let volume = a.get_network_metrics(PaymentNetwork::Ethereum).total_volume;
        assert_eq!(volume.to_string(), "4");

        let mut tiny = session("s3", PaymentNetwork::Polygon, PaymentStatus::Confirmed);
        tiny.amount = Decimal::from_str("0.1").unwrap();
        a.track_transaction(&tiny);
        tiny.amount = Decimal::from_str("0.2").unwrap();
        a.track_transaction(&tiny);
        assert_eq!(
            a.get_network_metrics(PaymentNetwork::Polygon).total_volume.to_string(),
            "0.3"
        );
    }

    #[test]
    fn average_processing_time() {
        let a = analytics();
        a.track_transaction(&session("s1", PaymentNetwork::Ethereum, PaymentStatus::Confirmed));
        let mut slow = session("s2", PaymentNetwork::Ethereum, PaymentStatus::Confirmed);
        slow.created_at = NOW - 2_000;
        a.track_transaction(&slow);

        assert_eq!(
            a.get_network_metrics(PaymentNetwork::Ethereum).average_processing_time,
            1_500.0
        );
    }

    #[test]
    fn untracked_network_is_zeroed() {
        let a = analytics();
        assert_eq!(a.get_network_metrics(PaymentNetwork::Solana), NetworkMetrics::default());
    }

    #[test]
    fn history_filters_by_network_and_time() {
        let a = analytics();
        let hour_ago = NOW - 3_600_000;
        let mut old = session("old", PaymentNetwork::Ethereum, PaymentStatus::Confirmed);
        old.created_at = hour_ago;
        old.updated_at = hour_ago + 1_000;
        a.track_transaction(&old);
        a.track_transaction(&session("eth", PaymentNetwork::Ethereum, PaymentStatus::Confirmed));
        a.track_transaction(&session("poly", PaymentNetwork::Polygon, PaymentStatus::Confirmed));

        let eth = a.get_transaction_history(Some(PaymentNetwork::Ethereum), None);
        assert_eq!(
            eth.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec!["old", "eth"]
        );

        let recent = a.get_transaction_history(None, Some(NOW - 1_800_000));
        assert_eq!(recent.len(), 2);

        let window = a.filter_history(&HistoryFilter {
            network: None,
            since: None,
            until: Some(NOW - 1_800_000),
        });
        assert_eq!(window.len(), 1);
        assert_eq!(a.get_transaction_history(None, None).len(), 3);
    }

    #[test]
    fn history_is_bounded_but_metrics_are_not() {
        let a = PaymentAnalytics::with_clock(
            AnalyticsConfig {
                history_capacity: 2,
                ..Default::default()
            },
            Arc::new(ManualClock::new(NOW)),
        );
        for i in 0..5 {
            a.track_transaction(&session(&format!("s{i}"), PaymentNetwork::Bsc, PaymentStatus::Confirmed));
        }
        assert_eq!(a.history_len(), 2);
        assert_eq!(a.get_transaction_history(None, None)[0].id.as_str(), "s3");
        assert_eq!(a.get_network_metrics(PaymentNetwork::Bsc).total_transactions, 5);
    }

    #[test]
    fn report_scoped_to_network() {
        let a = analytics();
        a.track_transaction(&session("s1", PaymentNetwork::Ethereum, PaymentStatus::Confirmed));
        a.track_transaction(&session("s2", PaymentNetwork::Polygon, PaymentStatus::Failed));

        let json: serde_json::Value =
            serde_json::from_str(&a.report_json(Some(PaymentNetwork::Ethereum)).unwrap()).unwrap();
        assert_eq!(json["timestamp"], NOW);
        assert_eq!(json["metrics"]["ETHEREUM"]["totalTransactions"], 1);
        assert!(json["metrics"].get("POLYGON").is_none());
        assert_eq!(json["recentTransactions"].as_array().unwrap().len(), 1);
        assert_eq!(json["summary"]["globalSuccessRate"], 1.0);
    }

    #[test]
    fn unscoped_report_lists_every_network() {
        let a = analytics();
        a.track_transaction(&session("s1", PaymentNetwork::Ethereum, PaymentStatus::Confirmed));
        a.track_transaction(&session("s2", PaymentNetwork::Polygon, PaymentStatus::Failed));

        let report = a.generate_report(None);
        assert_eq!(report.metrics.len(), PaymentNetwork::ALL.len());
        assert_eq!(report.metrics[&PaymentNetwork::Solana].total_transactions, 0);
        assert_eq!(report.summary.total_transactions, 2);
        assert_eq!(report.summary.global_success_rate, 0.5);
        assert_eq!(report.summary.average_processing_time, 1_000.0);
        assert_eq!(report.summary.total_volume.to_string(), "3");
    }

    #[test]
    fn report_keeps_only_newest_transactions() {
        let a = PaymentAnalytics::with_clock(
            AnalyticsConfig {
                recent_transactions_limit: 2,
                ..Default::default()
            },
            Arc::new(ManualClock::new(NOW)),
        );
        for i in 0..4 {
            a.track_transaction(&session(&format!("s{i}"), PaymentNetwork::Ethereum, PaymentStatus::Confirmed));
        }
        let ids: Vec<String> = a
            .generate_report(None)
            .recent_transactions
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["s2", "s3"]);
    }

    #[test]
    fn clear_metrics_resets_everything_and_is_idempotent() {
        let a = analytics();
        a.track_transaction(&session("s1", PaymentNetwork::Ethereum, PaymentStatus::Confirmed));
        a.record_outcome(&session("s2", PaymentNetwork::Polygon, PaymentStatus::Failed));

        a.clear_metrics();
        a.clear_metrics();
        for network in PaymentNetwork::ALL {
            let m = a.get_network_metrics(network);
            assert_eq!(m.total_transactions, 0);
            assert_eq!(m.successful_transactions, 0);
            assert_eq!(m.total_volume.to_string(), "0");
        }
        assert_eq!(a.history_len(), 0);
        assert!(a.record_outcome(&session("s2", PaymentNetwork::Polygon, PaymentStatus::Failed)));
    }

    #[test]
    fn record_outcome_counts_each_session_once() {
        let a = analytics();
        let s = session("s1", PaymentNetwork::Ethereum, PaymentStatus::Confirmed);
        assert!(a.record_outcome(&s));
        assert!(!a.record_outcome(&s));
        assert_eq!(a.get_network_metrics(PaymentNetwork::Ethereum).total_transactions, 1);
    }

    #[test]
    fn concurrent_tracking_is_consistent() {
        let a = analytics();
        std::thread::scope(|scope| {
            for t in 0..8 {
                let a = &a;
                scope.spawn(move || {
                    for i in 0..250 {
                        a.track_transaction(&session(
                            &format!("t{t}-{i}"),
                            PaymentNetwork::Solana,
                            PaymentStatus::Confirmed,
                        ));
                    }
                });
            }
        });

        let m = a.get_network_metrics(PaymentNetwork::Solana);
        assert_eq!(m.total_transactions, 2_000);
        assert_eq!(m.total_volume.to_string(), "3000");
        assert_eq!(m.retry_rate, 1.0);
    }

    fn arb_status() -> impl Strategy<Value = PaymentStatus> {
        prop_oneof![
            Just(PaymentStatus::Pending),
            Just(PaymentStatus::Confirmed),
            Just(PaymentStatus::Failed),
        ]
    }

    proptest! {
        #[test]
        fn counters_match_tracked_sessions(
            entries in prop::collection::vec((arb_status(), 0u32..10, 0i64..1_000_000), 1..40)
        ) {
            let a = analytics();
            for (i, (status, retries, cents)) in entries.iter().enumerate() {
                let mut s = session(&format!("s{i}"), PaymentNetwork::Ethereum, *status);
                s.retry_count = *retries;
                s.amount = Decimal::new(*cents, 2);
                a.track_transaction(&s);
            }

            let m = a.get_network_metrics(PaymentNetwork::Ethereum);
            let n = entries.len() as u64;
            prop_assert_eq!(m.total_transactions, n);
            prop_assert!(m.successful_transactions + m.failed_transactions <= n);

            let retry_sum: u64 = entries.iter().map(|(_, r, _)| u64::from(*r)).sum();
            prop_assert!((m.retry_rate - retry_sum as f64 / n as f64).abs() < 1e-9);

            let volume: Decimal = entries.iter().map(|(_, _, c)| Decimal::new(*c, 2)).sum();
            prop_assert_eq!(m.total_volume, volume);
        }
    }
}

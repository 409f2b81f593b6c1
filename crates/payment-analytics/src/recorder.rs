//! Feeds terminal session outcomes from an [`EventBus`] into the aggregator.

use std::sync::Arc;

use payment_session::{EventBus, SessionEvent, Subscription};
use tracing::debug;

use crate::aggregator::PaymentAnalytics;

/// Records each session once, the first time any event shows it in a
/// terminal status. Events for pending sessions and deletions are ignored.
#[derive(Debug)]
pub struct AnalyticsRecorder {
    subscription: Subscription,
}

impl AnalyticsRecorder {
    pub fn attach(bus: &EventBus, analytics: Arc<PaymentAnalytics>) -> Self {
        let subscription = bus.subscribe_all(move |event: &SessionEvent| {
            let Some(session) = event.session() else {
                return;
            };
            if session.is_terminal() && analytics.record_outcome(session) {
                debug!(
                    session_id = %session.id,
                    status = %session.status,
                    "Payment outcome recorded"
                );
            }
        });
        Self { subscription }
    }

    /// Stop recording. Returns false if the bus was already gone or cleared.
    pub fn detach(self) -> bool {
        self.subscription.unsubscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use payment_session::{SessionConfig, SessionStore};
    use payment_types::{ManualClock, PaymentNetwork, PaymentSession, PaymentStatus, PaymentToken, SessionId};
    use rust_decimal::Decimal;

    fn store() -> SessionStore {
        SessionStore::new(
            EventBus::new(),
            Arc::new(ManualClock::new(1_000)),
            SessionConfig::default(),
        )
    }

    fn pending(id: &str) -> PaymentSession {
        PaymentSession::new(
            SessionId::new(id),
            "user-1",
            PaymentToken::new("0xabc", "USDC", 6, PaymentNetwork::Ethereum),
            Decimal::new(25, 1),
            900,
        )
    }

    #[test]
    fn records_terminal_outcome_once() {
        let mut store = store();
        let analytics = Arc::new(PaymentAnalytics::default());
        let _recorder = AnalyticsRecorder::attach(store.bus(), analytics.clone());

        store.update_session(pending("s1"));
        assert_eq!(analytics.history_len(), 0);

        store.update_status(&SessionId::new("s1"), PaymentStatus::Confirmed);
        let confirmed = store.get_session(&SessionId::new("s1")).cloned().unwrap();
        store.update_session(confirmed);

        let m = analytics.get_network_metrics(PaymentNetwork::Ethereum);
        assert_eq!(m.total_transactions, 1);
        assert_eq!(m.successful_transactions, 1);
        assert_eq!(m.failed_transactions, 0);
    }

    #[test]
    fn detach_stops_recording() {
        let mut store = store();
        let analytics = Arc::new(PaymentAnalytics::default());
        let recorder = AnalyticsRecorder::attach(store.bus(), analytics.clone());
        assert!(recorder.detach());

        store.update_session(pending("s1"));
        store.update_status(&SessionId::new("s1"), PaymentStatus::Failed);
        assert_eq!(analytics.history_len(), 0);
    }

    #[test]
    fn new_uses_given_config() {
        let analytics = PaymentAnalytics::new(AnalyticsConfig::default());
        assert_eq!(analytics.config().recent_transactions_limit, 10);
    }
}

//! Contexts sharing one hub channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use payment_runtime::{PaymentContext, PaymentRuntimeConfig};
use payment_session::{BroadcastHub, SessionEvent, SessionEventKind, SyncOutcome};
use payment_types::{
    ManualClock, PaymentNetwork, PaymentSession, PaymentStatus, PaymentToken, SessionId, StatusDetails,
};
use rust_decimal::Decimal;

fn context(hub: &BroadcastHub, clock: &Arc<ManualClock>) -> PaymentContext {
    let config = PaymentRuntimeConfig::default();
    let port = hub.connect(&config.sync.channel_name);
    PaymentContext::with_channel(Box::new(port), clock.clone(), &config)
}

fn eth_session(id: &str, created_at: i64) -> PaymentSession {
    PaymentSession::new(
        SessionId::new(id),
        "user-1",
        PaymentToken::new("0xa0b8", "USDC", 6, PaymentNetwork::Ethereum),
        Decimal::new(42, 0),
        created_at,
    )
}

#[test]
fn confirmation_in_one_context_is_seen_by_another() {
    let hub = BroadcastHub::default();
    let clock = Arc::new(ManualClock::new(10_000));
    let mut a = context(&hub, &clock);
    let mut b = context(&hub, &clock);
    a.pump();
    b.pump();

    a.update_session(eth_session("S1", 10_000));
    b.pump();
    assert_eq!(
        b.get_session(&SessionId::new("S1")).unwrap().status,
        PaymentStatus::Pending
    );

    clock.advance(1_500);
    b.update_status_with(
        &SessionId::new("S1"),
        PaymentStatus::Confirmed,
        StatusDetails::confirmed("0x77aa"),
    );
    a.pump();

    let s1 = a.get_session(&SessionId::new("S1")).unwrap();
    assert_eq!(s1.status, PaymentStatus::Confirmed);
    assert_eq!(s1.updated_at, 11_500);
    assert_eq!(s1.tx_hash.as_deref(), Some("0x77aa"));

    for ctx in [&a, &b] {
        let m = ctx.analytics().get_network_metrics(PaymentNetwork::Ethereum);
        assert_eq!(m.successful_transactions, 1);
        assert_eq!(m.failed_transactions, 0);
        assert_eq!(m.average_processing_time, 1_500.0);
    }
}

#[test]
fn peers_see_events_in_order() {
    let hub = BroadcastHub::default();
    let clock = Arc::new(ManualClock::new(10_000));
    let mut a = context(&hub, &clock);
    let mut b = context(&hub, &clock);
    b.pump();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let _sub = b.bus().subscribe_all(move |event: &SessionEvent| log.lock().push(event.kind()));

    a.update_session(eth_session("S1", 10_000));
    clock.advance(10);
    a.update_status(&SessionId::new("S1"), PaymentStatus::Failed);
    clock.advance(10);
    a.delete_session(&SessionId::new("S1"));
    b.pump();

    assert_eq!(
        *seen.lock(),
        vec![
            SessionEventKind::SessionUpdated,
            SessionEventKind::StatusUpdated,
            SessionEventKind::SessionDeleted,
        ]
    );
    assert!(b.get_session(&SessionId::new("S1")).is_none());
}

#[test]
fn late_joiner_resyncs_live_sessions() {
    let hub = BroadcastHub::default();
    let clock = Arc::new(ManualClock::new(10_000));
    let mut a = context(&hub, &clock);
    a.update_session(eth_session("S1", 10_000));
    a.update_session(eth_session("S2", 10_000));

    let mut late = context(&hub, &clock);
    let answered = a.pump();
    assert!(answered.contains(&SyncOutcome::Resynced(2)));

    late.pump();
    assert!(late.get_session(&SessionId::new("S1")).is_some());
    assert!(late.get_session(&SessionId::new("S2")).is_some());
}

#[test]
fn cleanup_twice_and_closed_context_ignores_traffic() {
    let hub = BroadcastHub::default();
    let clock = Arc::new(ManualClock::new(10_000));
    let mut a = context(&hub, &clock);
    let mut b = context(&hub, &clock);

    b.cleanup();
    b.cleanup();
    assert!(b.is_closed());

    a.update_session(eth_session("S1", 10_000));
    assert!(b.pump().is_empty());
    assert!(b.get_session(&SessionId::new("S1")).is_none());
}

#[tokio::test]
async fn next_remote_waits_for_peer() {
    let hub = BroadcastHub::default();
    let clock = Arc::new(ManualClock::new(10_000));
    let mut a = context(&hub, &clock);
    let mut b = context(&hub, &clock);
    a.pump();
    b.pump();

    a.update_session(eth_session("S1", 10_000));
    let outcome = tokio::time::timeout(Duration::from_secs(1), b.next_remote())
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Applied(ref s) if s.id.as_str() == "S1"));
}

//! One context's wiring: event bus, store, synchronizer and analytics.

use std::sync::Arc;

use payment_analytics::{AnalyticsRecorder, PaymentAnalytics};
use payment_session::{
    BroadcastHub, EventBus, SessionStore, SessionSynchronizer, StoreOutcome, SyncChannel,
    SyncOutcome, SyncStats,
};
use payment_types::{Clock, PaymentSession, PaymentStatus, SessionId, StatusDetails, SystemClock};
use tracing::info;

use crate::config::PaymentRuntimeConfig;
use crate::error::RuntimeResult;

/// A fully wired context. Terminal outcomes seen on its bus, local or
/// remote, are recorded in its analytics exactly once per session.
#[derive(Debug)]
pub struct PaymentContext {
    sync: SessionSynchronizer,
    analytics: Arc<PaymentAnalytics>,
    recorder: Option<AnalyticsRecorder>,
}

impl PaymentContext {
    /// Join the hub channel named in `config.sync`.
    pub fn connect(hub: &BroadcastHub, config: &PaymentRuntimeConfig) -> Self {
        let port = hub.connect(&config.sync.channel_name);
        Self::with_channel(Box::new(port), Arc::new(SystemClock), config)
    }

    pub fn with_channel(
        channel: Box<dyn SyncChannel>,
        clock: Arc<dyn Clock>,
        config: &PaymentRuntimeConfig,
    ) -> Self {
        let bus = EventBus::new();
        let analytics = Arc::new(PaymentAnalytics::with_clock(
            config.analytics.clone(),
            clock.clone(),
        ));
        let recorder = AnalyticsRecorder::attach(&bus, analytics.clone());

        let store = SessionStore::new(bus, clock, config.session.clone());
        let sync = SessionSynchronizer::new(store, channel, config.sync.clone());
        info!(context_id = sync.context_id(), "Payment context started");

        Self {
            sync,
            analytics,
            recorder: Some(recorder),
        }
    }

    pub fn context_id(&self) -> &str {
        self.sync.context_id()
    }

    pub fn bus(&self) -> &EventBus {
        self.sync.store().bus()
    }

    pub fn analytics(&self) -> &Arc<PaymentAnalytics> {
        &self.analytics
    }

    pub fn synchronizer(&self) -> &SessionSynchronizer {
        &self.sync
    }

    pub fn stats(&self) -> SyncStats {
        self.sync.stats()
    }

    pub fn update_session(&mut self, session: PaymentSession) -> StoreOutcome {
        self.sync.update_session(session)
    }

    pub fn update_status(&mut self, id: &SessionId, status: PaymentStatus) -> StoreOutcome {
        self.sync.update_status(id, status)
    }

    pub fn update_status_with(
        &mut self,
        id: &SessionId,
        status: PaymentStatus,
        details: StatusDetails,
    ) -> StoreOutcome {
        self.sync.update_status_with(id, status, details)
    }

    pub fn retry(&mut self, id: &SessionId) -> StoreOutcome {
        self.sync.retry(id)
    }

    pub fn expire_pending(&mut self) -> Vec<StoreOutcome> {
        self.sync.expire_pending()
    }

    pub fn delete_session(&mut self, id: &SessionId) -> StoreOutcome {
        self.sync.delete_session(id)
    }

    pub fn get_session(&self, id: &SessionId) -> Option<&PaymentSession> {
        self.sync.get_session(id)
    }

    pub fn current_session(&self) -> Option<&PaymentSession> {
        self.sync.store().current_session()
    }

    /// Apply pending remote messages without waiting.
    pub fn pump(&mut self) -> Vec<SyncOutcome> {
        self.sync.pump()
    }

    pub async fn next_remote(&mut self) -> Option<SyncOutcome> {
        self.sync.next_remote().await
    }

    pub fn report_json(&self) -> RuntimeResult<String> {
        Ok(self.analytics.report_json(None)?)
    }

    /// Stop recording, close the channel and clear local sessions.
    ///
    /// Analytics keep their data. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            recorder.detach();
        }
        self.sync.cleanup();
    }

    pub fn is_closed(&self) -> bool {
        self.sync.is_closed()
    }
}

impl Drop for PaymentContext {
    fn drop(&mut self) {
        self.cleanup();
    }
}

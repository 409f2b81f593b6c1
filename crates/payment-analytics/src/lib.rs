//! # payment-analytics
//!
//! Per-network statistics over payment transactions:
//!
//! - [`PaymentAnalytics`]: thread-safe aggregator with bounded history and
//!   exact running sums
//! - [`AnalyticsReport`]: JSON-serializable snapshot
//! - [`AnalyticsRecorder`]: wires terminal outcomes from a session
//!   [`EventBus`](payment_session::EventBus) into an aggregator
//!
//! One aggregator is shared per context through `Arc`; there is no global
//! instance.

#![deny(unsafe_code)]

pub mod aggregator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod recorder;
pub mod report;

pub use aggregator::{HistoryFilter, PaymentAnalytics};
pub use config::AnalyticsConfig;
pub use error::{AnalyticsError, Result};
pub use metrics::NetworkMetrics;
pub use recorder::AnalyticsRecorder;
pub use report::{AnalyticsReport, ReportSummary};

//! # payment-runtime
//!
//! Bootstrap for a payment context: loads [`PaymentRuntimeConfig`], installs
//! logging and wires a [`PaymentContext`] (store, event bus, synchronizer and
//! analytics) onto a sync channel.

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod error;
pub mod logging;

pub use config::{LoggingConfig, PaymentRuntimeConfig};
pub use context::PaymentContext;
pub use error::{RuntimeError, RuntimeResult};
pub use logging::init_logging;

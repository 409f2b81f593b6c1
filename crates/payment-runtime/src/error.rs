//! Runtime errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Analytics(#[from] payment_analytics::AnalyticsError),
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

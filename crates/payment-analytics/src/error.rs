use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("failed to serialize analytics report: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

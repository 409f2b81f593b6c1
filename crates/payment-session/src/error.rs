//! Error types for the session subsystem.
//!
//! Store-level rejections are reported as [`crate::StoreOutcome`] values,
//! not errors; these types cover the channel and wire layers.

use thiserror::Error;

/// Failure talking to the cross-context broadcast channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("channel `{0}` is closed")]
    Closed(String),

    #[error("failed to encode sync message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from the cross-context synchronizer.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("malformed sync message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_channel_names_the_channel() {
        let err = ChannelError::Closed("payment_sync".into());
        assert_eq!(err.to_string(), "channel `payment_sync` is closed");
    }

    #[test]
    fn channel_error_converts_into_sync_error() {
        let err: SyncError = ChannelError::Closed("x".into()).into();
        assert!(matches!(err, SyncError::Channel(ChannelError::Closed(_))));
    }
}

//! Configuration for the session store and synchronizer.

use serde::{Deserialize, Serialize};

/// Session store behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Retries allowed before a retry request fails the session.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Age after which a `PENDING` session is expired to `FAILED`.
    #[serde(default = "default_pending_timeout_ms")]
    pub pending_timeout_ms: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            pending_timeout_ms: default_pending_timeout_ms(),
        }
    }
}

/// Cross-context synchronizer behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Name of the origin-scoped broadcast channel.
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Ask peers for their live sessions when connecting.
    #[serde(default = "default_true")]
    pub resync_on_connect: bool,

    /// Deleted-session markers kept to reject late, older updates.
    #[serde(default = "default_max_tombstones")]
    pub max_tombstones: usize,

    /// Per-channel buffer of the in-process broadcast hub.
    #[serde(default = "default_hub_capacity")]
    pub hub_capacity: usize,

    /// Remote timestamps further ahead of the local clock than this are rejected.
    #[serde(default = "default_max_clock_skew_ms")]
    pub max_clock_skew_ms: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_name: default_channel_name(),
            resync_on_connect: true,
            max_tombstones: default_max_tombstones(),
            hub_capacity: default_hub_capacity(),
            max_clock_skew_ms: default_max_clock_skew_ms(),
        }
    }
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_pending_timeout_ms() -> i64 {
    10 * 60 * 1000
}

fn default_channel_name() -> String {
    "payment_sync".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_max_tombstones() -> usize {
    1024
}

const fn default_hub_capacity() -> usize {
    256
}

const fn default_max_clock_skew_ms() -> i64 {
    60 * 60 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let session = SessionConfig::default();
        assert_eq!(session.max_retries, 3);
        assert_eq!(session.pending_timeout_ms, 600_000);

        let sync = SyncConfig::default();
        assert_eq!(sync.channel_name, "payment_sync");
        assert!(sync.resync_on_connect);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let sync: SyncConfig = serde_json::from_str(r#"{"channel_name":"other"}"#).unwrap();
        assert_eq!(sync.channel_name, "other");
        assert_eq!(sync.max_tombstones, 1024);
        assert_eq!(sync.hub_capacity, 256);
        assert_eq!(sync.max_clock_skew_ms, 3_600_000);
    }
}

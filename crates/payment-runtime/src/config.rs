//! Layered runtime configuration.
//!
//! Sources, later ones winning: built-in defaults, an optional file, then
//! `PAYMENT_SYNC__<SECTION>__<KEY>` environment variables.

use payment_analytics::AnalyticsConfig;
use payment_session::{SessionConfig, SyncConfig};
use serde::{Deserialize, Serialize};

use crate::error::RuntimeResult;

pub const ENV_PREFIX: &str = "PAYMENT_SYNC";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentRuntimeConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG` when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PaymentRuntimeConfig {
    /// Load configuration, reading `path` when given and present.
    pub fn load(path: Option<&str>) -> RuntimeResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&PaymentRuntimeConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}

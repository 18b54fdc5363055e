use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::HostContentMap;

/// Harness configuration, usually loaded from a YAML fixture file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HarnessConfig {
    /// Hostname to the content tree its mock server serves
    #[serde(default)]
    pub hosts: HostContentMap,

    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Timeouts used by the server pool and the client library
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// How long scope exit waits for each server thread
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,

    #[serde(default = "default_keepalive")]
    pub keepalive_interval_seconds: u64,

    /// Idle SSH sessions on a mock server are dropped after this long
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_seconds: u64,
}

impl LimitsConfig {
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    #[must_use]
    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_seconds)
    }

    #[must_use]
    pub const fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_seconds)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: default_stop_timeout_ms(),
            connection_timeout_seconds: default_connection_timeout(),
            keepalive_interval_seconds: default_keepalive(),
            inactivity_timeout_seconds: default_inactivity_timeout(),
        }
    }
}

const fn default_stop_timeout_ms() -> u64 {
    5000
}

const fn default_connection_timeout() -> u64 {
    10
}

const fn default_keepalive() -> u64 {
    30
}

const fn default_inactivity_timeout() -> u64 {
    300
}

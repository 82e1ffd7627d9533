//! Session cache and tool dispatch settings.

use serde::{Deserialize, Serialize};

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle lifetime of a session→thread mapping, refreshed on each hit.
    pub ttl_secs: u64,
    /// Maximum number of cached sessions.
    pub capacity: usize,
    /// How often the gateway sweeps expired sessions.
    pub reap_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,
            capacity: 1024,
            reap_interval_secs: 60,
        }
    }
}

/// Tool dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct DispatchConfig {
    /// Maximum pauses handled in one turn. `0` disables the limit.
    pub max_tool_rounds: u32,
}

//! Environment variable overrides.
//!
//! Secrets and deployment-specific ids usually live in the environment
//! rather than in `config.toml`. Resolution order for the API key:
//! 1. `BEACON_API_KEY`
//! 2. `OPENAI_API_KEY`
//! 3. `AZURE_OPENAI_API_KEY`
//! 4. `remote.api_key` from the file

use tracing::debug;

use crate::schema::BeaconConfig;

const API_KEY_VARS: &[&str] = &["BEACON_API_KEY", "OPENAI_API_KEY", "AZURE_OPENAI_API_KEY"];

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut BeaconConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary lookup (used by tests).
pub fn apply_overrides_from(config: &mut BeaconConfig, lookup: impl Fn(&str) -> Option<String>) {
    let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some((var, key)) = API_KEY_VARS
        .iter()
        .find_map(|var| present(var).map(|key| (*var, key)))
    {
        debug!(var, "API key taken from environment");
        config.remote.api_key = key;
    }

    if let Some(id) = present("BEACON_ASSISTANT_ID") {
        config.remote.assistant_id = id;
    }

    if let Some(url) = present("BEACON_BASE_URL") {
        config.remote.base_url = url;
    }
}

//! Validation for the `[remote]` section.

use crate::schema::BeaconConfig;

use super::helpers::{validate_not_blank, validate_range};

pub(crate) fn validate_remote(errors: &mut Vec<String>, config: &BeaconConfig) {
    let remote = &config.remote;

    validate_not_blank(errors, "remote.base_url", &remote.base_url);
    if !remote.base_url.starts_with("http://") && !remote.base_url.starts_with("https://") {
        errors.push(format!(
            "remote.base_url = {:?} must start with http:// or https://",
            remote.base_url
        ));
    }
    if let Some(version) = &remote.api_version {
        validate_not_blank(errors, "remote.api_version", version);
    }

    validate_range(
        errors,
        "remote.connect_timeout_secs",
        remote.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "remote.request_timeout_secs",
        remote.request_timeout_secs,
        1,
        600,
    );
    validate_range(
        errors,
        "remote.stream_idle_timeout_secs",
        remote.stream_idle_timeout_secs,
        1,
        600,
    );
    validate_range(
        errors,
        "remote.max_read_retries",
        u64::from(remote.max_read_retries),
        0,
        10,
    );
}

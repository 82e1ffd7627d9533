//! Validation for session, gateway, and data sections.

use crate::schema::BeaconConfig;

use super::helpers::{validate_not_blank, validate_range};

pub(crate) fn validate_session(errors: &mut Vec<String>, config: &BeaconConfig) {
    validate_range(errors, "session.ttl_secs", config.session.ttl_secs, 1, 86_400);
    validate_range(
        errors,
        "session.capacity",
        config.session.capacity as u64,
        1,
        1_000_000,
    );
    validate_range(
        errors,
        "session.reap_interval_secs",
        config.session.reap_interval_secs,
        1,
        3_600,
    );
}

pub(crate) fn validate_gateway(errors: &mut Vec<String>, config: &BeaconConfig) {
    validate_not_blank(errors, "gateway.bind", &config.gateway.bind);
    if !config.gateway.file_route.starts_with('/') {
        errors.push(format!(
            "gateway.file_route = {:?} must start with '/'",
            config.gateway.file_route
        ));
    }
}

pub(crate) fn validate_data(errors: &mut Vec<String>, config: &BeaconConfig) {
    validate_range(
        errors,
        "data.time_series_records",
        u64::from(config.data.time_series_records),
        1,
        1_000_000,
    );
    validate_range(
        errors,
        "data.time_series_interval_secs",
        u64::from(config.data.time_series_interval_secs),
        1,
        86_400,
    );
}

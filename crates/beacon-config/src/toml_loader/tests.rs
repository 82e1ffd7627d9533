//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use crate::schema::RemoteAuth;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_parse_error() {
    let result = load_from_path(Path::new("/tmp/nonexistent_beacon_config.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, beacon_common::ConfigError::ParseError(_)));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[remote]
base_url = "https://contoso.openai.azure.com/openai"
auth = "azure_api_key"
api_version = "2024-05-01-preview"

[gateway]
port = 9090
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.remote.auth, RemoteAuth::AzureApiKey);
    assert_eq!(
        config.remote.api_version.as_deref(),
        Some("2024-05-01-preview")
    );
    assert_eq!(config.gateway.port, 9090);
    // Defaults preserved
    assert_eq!(config.session.ttl_secs, 1800);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, beacon_common::ConfigError::ParseError(_)));
}

#[test]
fn out_of_range_values_are_returned_as_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[session]\nttl_secs = 0\n").unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.session.ttl_secs, 0);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("beacon").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.remote.base_url, "https://api.openai.com/v1");
    assert_eq!(config.session.capacity, 1024);
}

#[test]
fn default_config_path_ends_with_beacon_config() {
    if let Ok(path) = default_config_path() {
        assert!(path.ends_with("beacon/config.toml"));
    }
}

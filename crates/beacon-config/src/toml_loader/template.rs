//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Beacon Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[remote]
# base_url = "https://api.openai.com/v1"
# auth = "bearer"               # bearer | azure_api_key
# api_key = ""                  # prefer BEACON_API_KEY / OPENAI_API_KEY
# api_version = "2024-05-01-preview"
# assistant_id = ""             # or BEACON_ASSISTANT_ID
# connect_timeout_secs = 10     # 1-120
# request_timeout_secs = 120    # 1-600
# stream_idle_timeout_secs = 90 # 1-600
# max_read_retries = 2          # 0-10

[session]
# ttl_secs = 1800               # 1-86400
# capacity = 1024               # 1-1000000
# reap_interval_secs = 60       # 1-3600

[dispatch]
# max_tool_rounds = 0           # 0 = unlimited

[gateway]
# bind = "0.0.0.0"
# port = 8080
# file_route = "/api/file"

[data]
# time_series_records = 50000   # 1-1000000
# time_series_interval_secs = 60

[logging]
# level = "INFO"                # DEBUG | INFO | WARNING | ERROR
"##
    .to_string()
}

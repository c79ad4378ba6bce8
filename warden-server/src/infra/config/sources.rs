use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub jobs: FileJobsConfig,
    #[serde(default)]
    pub upstream: FileUpstreamConfig,
    #[serde(default)]
    pub notifier: FileNotifierConfig,
    #[serde(default)]
    pub history: FileHistoryConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Durations are humantime strings such as `10m` or `1h 30m`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileJobsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_retention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_buffer: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queue_len: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileUpstreamConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_check_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valuation_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileNotifierConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileHistoryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub idle_retention: Option<String>,
    pub event_buffer: Option<usize>,
    pub max_queue_len: Option<usize>,
    pub ban_check_url: Option<String>,
    pub valuation_url: Option<String>,
    pub request_timeout: Option<String>,
    pub api_key: Option<String>,
    pub notifier_enabled: Option<bool>,
    pub notifier_timeout: Option<String>,
    pub history_path: Option<PathBuf>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var("WARDEN_CONFIG_PATH").map(PathBuf::from),
            server_host: non_empty_var("SERVER_HOST"),
            server_port: parse_var("SERVER_PORT"),
            idle_retention: non_empty_var("WARDEN_IDLE_RETENTION"),
            event_buffer: parse_var("WARDEN_EVENT_BUFFER"),
            max_queue_len: parse_var("WARDEN_MAX_QUEUE_LEN"),
            ban_check_url: non_empty_var("WARDEN_BAN_CHECK_URL"),
            valuation_url: non_empty_var("WARDEN_VALUATION_URL"),
            request_timeout: non_empty_var("WARDEN_REQUEST_TIMEOUT"),
            api_key: non_empty_var("WARDEN_UPSTREAM_API_KEY"),
            notifier_enabled: parse_bool_var("WARDEN_NOTIFIER_ENABLED"),
            notifier_timeout: non_empty_var("WARDEN_NOTIFIER_TIMEOUT"),
            history_path: non_empty_var("WARDEN_HISTORY_PATH")
                .map(PathBuf::from),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    non_empty_var(name).and_then(|raw| raw.parse().ok())
}

fn parse_bool_var(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|raw| {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    })
}

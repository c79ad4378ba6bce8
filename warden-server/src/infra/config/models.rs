use std::{net::SocketAddr, path::PathBuf, time::Duration};

use url::Url;

/// Fully composed runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub jobs: JobsConfig,
    pub upstream: UpstreamConfig,
    pub notifier: NotifierConfig,
    pub history: HistoryConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.bind_address().parse().ok()
    }
}

#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// How long a terminal job with no subscribers is retained.
    pub idle_retention: Duration,
    /// Broadcast capacity per job before slow subscribers start lagging.
    pub event_buffer: usize,
    pub max_queue_len: usize,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub ban_check_url: Option<Url>,
    /// Stage 2 is skipped when unset.
    pub valuation_url: Option<Url>,
    pub request_timeout: Duration,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

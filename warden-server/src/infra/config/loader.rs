use once_cell::sync::Lazy;
use std::{fs, path::PathBuf, time::Duration};
use thiserror::Error;
use url::Url;

use super::{
    models::{
        Config, ConfigMetadata, HistoryConfig, JobsConfig, NotifierConfig,
        ServerConfig, UpstreamConfig,
    },
    sources::{EnvConfig, FileConfig},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("warden.toml"),
        PathBuf::from("config/warden.toml"),
    ]
});

const DEFAULT_IDLE_RETENTION: Duration = Duration::from_secs(10 * 60);
const DEFAULT_EVENT_BUFFER: usize = 1024;
const DEFAULT_MAX_QUEUE_LEN: usize = 5000;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_NOTIFIER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads the `.env` file (if any), reads the process environment and
    /// composes the final configuration.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Composes configuration from the given environment values without
    /// touching the process environment.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) = compose_config(file_config, env, config_path)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env.config_path {
            source.env = Some(from_env.clone());
        } else {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
                path: path.clone(),
                source,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| {
                ConfigLoadError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if config_path.is_none() {
        warnings.push_with_hint(
            "No warden.toml detected; falling back to environment variables",
            "Copy warden.example.toml to warden.toml to configure the server",
        );
    }

    let FileConfig {
        server: file_server,
        jobs: file_jobs,
        upstream: file_upstream,
        notifier: file_notifier,
        history: file_history,
    } = file_config.unwrap_or_default();

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(3000),
    };

    let event_buffer = env
        .event_buffer
        .or(file_jobs.event_buffer)
        .unwrap_or(DEFAULT_EVENT_BUFFER);
    if event_buffer == 0 {
        warnings.push("jobs.event_buffer of 0 is raised to 1");
    }
    let jobs = JobsConfig {
        idle_retention: resolve_duration(
            "jobs.idle_retention",
            env.idle_retention.or(file_jobs.idle_retention),
            DEFAULT_IDLE_RETENTION,
        )?,
        event_buffer: event_buffer.max(1),
        max_queue_len: env
            .max_queue_len
            .or(file_jobs.max_queue_len)
            .unwrap_or(DEFAULT_MAX_QUEUE_LEN),
    };

    let ban_check_url = resolve_url(
        "upstream.ban_check_url",
        env.ban_check_url.or(file_upstream.ban_check_url),
    )?;
    if ban_check_url.is_none() {
        warnings.push_with_hint(
            "upstream.ban_check_url is not set; jobs cannot be processed",
            "Set WARDEN_BAN_CHECK_URL or [upstream].ban_check_url",
        );
    }
    let valuation_url = resolve_url(
        "upstream.valuation_url",
        env.valuation_url.or(file_upstream.valuation_url),
    )?;
    if ban_check_url.is_some() && valuation_url.is_none() {
        warnings.push(
            "upstream.valuation_url is not set; clean items will not be valued",
        );
    }
    let upstream = UpstreamConfig {
        ban_check_url,
        valuation_url,
        request_timeout: resolve_duration(
            "upstream.request_timeout",
            env.request_timeout.or(file_upstream.request_timeout),
            DEFAULT_REQUEST_TIMEOUT,
        )?,
        api_key: env
            .api_key
            .or(file_upstream.api_key)
            .filter(|key| !key.trim().is_empty()),
    };

    let notifier = NotifierConfig {
        enabled: env
            .notifier_enabled
            .or(file_notifier.enabled)
            .unwrap_or(true),
        timeout: resolve_duration(
            "notifier.timeout",
            env.notifier_timeout.or(file_notifier.timeout),
            DEFAULT_NOTIFIER_TIMEOUT,
        )?,
    };

    let history = HistoryConfig {
        path: env
            .history_path
            .or(file_history.path)
            .unwrap_or_else(|| PathBuf::from("./data/history.json")),
    };

    let config = Config {
        server,
        jobs,
        upstream,
        notifier,
        history,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded: false,
        },
    };

    Ok((config, warnings))
}

fn resolve_duration(
    field: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        Some(value) => humantime::parse_duration(value.trim()).map_err(
            |source| ConfigLoadError::InvalidDuration {
                field,
                value,
                source,
            },
        ),
        None => Ok(default),
    }
}

fn resolve_url(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<Url>, ConfigLoadError> {
    let Some(value) = raw.filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    Url::parse(value.trim())
        .map(Some)
        .map_err(|source| ConfigLoadError::InvalidUrl {
            field,
            value,
            source,
        })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid duration '{value}' for {field}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("invalid URL '{value}' for {field}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

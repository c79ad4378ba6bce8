pub mod loader;
pub mod models;
pub mod sources;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigWarnings};
pub use models::{
    Config, ConfigMetadata, HistoryConfig, JobsConfig, NotifierConfig,
    ServerConfig, UpstreamConfig,
};

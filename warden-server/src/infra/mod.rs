pub mod app_state;
pub mod config;
pub mod errors;
pub mod history;
pub mod jobs;
pub mod notify;
pub mod upstream;

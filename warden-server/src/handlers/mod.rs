//! HTTP request handlers organized by functionality

pub mod health;
pub mod jobs;

pub use health::health_handler;

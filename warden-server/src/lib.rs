//! # Warden Server
//!
//! Batch verification orchestrator.
//!
//! A caller submits a list of identifiers; the server runs each through a
//! ban check and a valuation lookup in submission order, streams progress to
//! any number of subscribers over SSE, and supports pause, resume and stop
//! while the batch is running. Partial reports are available at any time.
//!
//! ## Architecture
//!
//! - [`infra::jobs`]: Job Store, Job Runner and Event Broadcaster
//! - [`infra::notify`]: best-effort webhook notifications
//! - [`infra::upstream`]: the HTTP item processor
//! - [`infra::history`]: JSON-file history of per-identifier outcomes
//! - [`routes`] and [`handlers`]: the axum HTTP/SSE surface

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
pub use routes::create_app;

//! # Warden Core
//!
//! Domain types and pure logic shared by the Warden batch verification
//! orchestrator.
//!
//! ## Overview
//!
//! A submitted batch of identifiers becomes a job. Every identifier is run
//! through a two-stage upstream check (ban lookup, then valuation) by an
//! [`ItemProcessor`], and each result is recorded as an [`ItemOutcome`].
//! This crate owns:
//!
//! - **Job model**: [`JobId`], [`JobStatus`] and queue de-duplication
//! - **Outcomes**: tagged per-item results where upstream failures are data
//! - **Events**: the [`JobEvent`] union fanned out to live subscribers
//! - **Reports**: the pure Report Summarizer ([`summarize`], [`build_report`])
//! - **Ports**: the [`ItemProcessor`] and [`HistoryStore`] collaborator traits
//!
//! The orchestrator itself (job store, runner, broadcaster, notifier) lives in
//! `warden-server`.

pub mod api_types;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Result, WardenError};
pub use traits::{
    history::{HistoryStore, InMemoryHistoryStore},
    processor::ItemProcessor,
};
pub use types::{
    events::{JobEvent, NotificationStage},
    job::{JobId, JobStatus, dedupe_queue},
    log::{LogEntry, Severity},
    outcome::{ItemOutcome, OutcomeKind},
    report::{FinalReport, Report, Summary, build_report, summarize},
};

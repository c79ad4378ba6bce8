//! Report Summarizer.
//!
//! Everything here is a pure function of a job's queue length and its
//! accumulated outcomes, so a partial report can be computed mid-run without
//! touching job state and a final report over the same data yields the same
//! counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    job::{JobId, JobStatus},
    outcome::ItemOutcome,
};

/// Aggregate counts over a job's outcomes. Derived on demand, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub requested: usize,
    pub processed: usize,
    pub pending: usize,
    /// Identifiers abandoned because the job was stopped early.
    pub skipped: usize,
    pub clean: usize,
    pub flagged: usize,
    pub stage1_errors: usize,
    pub stage2_errors: usize,
    pub total_value: f64,
}

/// Summary plus the successful valuations, highest value first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub summary: Summary,
    pub successful: Vec<ItemOutcome>,
}

/// Report attached to a job once it reaches `complete` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub stopped_early: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub report: Report,
    pub finished_at: DateTime<Utc>,
}

/// Computes aggregate counts.
///
/// `pending` is the unprocessed remainder of the queue, except for a job that
/// was stopped early: nothing is pending any more and the remainder is
/// reported as `skipped` instead.
pub fn summarize(
    requested: usize,
    results: &[ItemOutcome],
    stopped_early: bool,
) -> Summary {
    let processed = results.len();
    let remainder = requested.saturating_sub(processed);
    let (pending, skipped) = if stopped_early {
        (0, remainder)
    } else {
        (remainder, 0)
    };

    let mut summary = Summary {
        requested,
        processed,
        pending,
        skipped,
        ..Summary::default()
    };

    for outcome in results {
        if outcome.is_flagged() {
            summary.flagged += 1;
        } else if outcome.is_stage1_error() {
            summary.stage1_errors += 1;
        } else {
            summary.clean += 1;
        }
        if outcome.is_stage2_error() {
            summary.stage2_errors += 1;
        }
        if outcome.is_valued() {
            summary.total_value += outcome.value;
        }
    }

    summary
}

/// Builds the presentation report: summary plus successful valuations sorted
/// by descending value. The sort is stable, so equal values keep processing
/// order.
pub fn build_report(
    requested: usize,
    results: &[ItemOutcome],
    stopped_early: bool,
) -> Report {
    let mut successful: Vec<ItemOutcome> = results
        .iter()
        .filter(|outcome| outcome.is_valued())
        .cloned()
        .collect();
    successful.sort_by(|a, b| b.value.total_cmp(&a.value));

    Report {
        summary: summarize(requested, results, stopped_early),
        successful,
    }
}

//! Job Runner: the per-job state machine and the task that drains its queue.
//!
//! The driver task owns `cursor` and `results`. Control signals only flip the
//! pause flag or move the status to `stopping`; the driver observes both
//! between items, never mid-item.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::{Notify, broadcast},
    task::AbortHandle,
};
use tracing::{debug, error, info, warn};
use url::Url;
use warden_core::{
    FinalReport, HistoryStore, ItemOutcome, ItemProcessor, JobEvent, JobId,
    JobStatus, LogEntry, NotificationStage, OutcomeKind, Report, Severity,
    build_report,
};

use super::{
    JobControlPlaneInner, JobSnapshot,
    broadcast::JobFrame,
    error::{JobControlError, JobFault},
};
use crate::infra::notify::{Notification, Notifier};

pub(crate) struct JobRun {
    job_id: JobId,
    notify_target: Option<Url>,
    created_at: DateTime<Utc>,
    idle_retention: Duration,
    pub(crate) state: Mutex<JobRunState>,
    tx: broadcast::Sender<JobFrame>,
    wake: Notify,
    notifier: Notifier,
    history: Arc<dyn HistoryStore>,
    inner: Weak<JobControlPlaneInner>,
}

#[derive(Debug)]
pub(crate) struct JobRunState {
    pub(crate) status: JobStatus,
    pub(crate) queue: Vec<String>,
    pub(crate) cursor: usize,
    pub(crate) results: Vec<ItemOutcome>,
    pub(crate) pause_requested: bool,
    pub(crate) sequence: u64,
    pub(crate) logs: Vec<JobFrame>,
    pub(crate) terminal_frame: Option<JobFrame>,
    pub(crate) end_frame: Option<JobFrame>,
    pub(crate) final_report: Option<FinalReport>,
    pub(crate) subscribers: usize,
    pub(crate) cleanup: Option<AbortHandle>,
    pub(crate) terminal_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum Step {
    Process { index: usize, id: String },
    Wait,
    Finish { stopped_early: bool },
    Fault(JobFault),
    Exit,
}

pub(crate) struct JobRunParts {
    pub(crate) queue: Vec<String>,
    pub(crate) notify_target: Option<Url>,
    pub(crate) idle_retention: Duration,
    pub(crate) event_buffer: usize,
    pub(crate) notifier: Notifier,
    pub(crate) history: Arc<dyn HistoryStore>,
    pub(crate) inner: Weak<JobControlPlaneInner>,
}

impl JobRun {
    pub(crate) fn new(parts: JobRunParts) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(parts.event_buffer.max(1));
        Arc::new(JobRun {
            job_id: JobId::new(),
            notify_target: parts.notify_target,
            created_at: Utc::now(),
            idle_retention: parts.idle_retention,
            state: Mutex::new(JobRunState {
                status: JobStatus::Pending,
                queue: parts.queue,
                cursor: 0,
                results: Vec::new(),
                pause_requested: false,
                sequence: 0,
                logs: Vec::new(),
                terminal_frame: None,
                end_frame: None,
                final_report: None,
                subscribers: 0,
                cleanup: None,
                terminal_at: None,
            }),
            tx,
            wake: Notify::new(),
            notifier: parts.notifier,
            history: parts.history,
            inner: parts.inner,
        })
    }

    pub(crate) fn job_id(&self) -> JobId {
        self.job_id
    }

    pub(crate) fn sender(&self) -> &broadcast::Sender<JobFrame> {
        &self.tx
    }

    fn log(&self, state: &mut JobRunState, entry: LogEntry) {
        match entry.severity {
            Severity::Info | Severity::Success => info!(
                target: "jobs::runner",
                job = %self.job_id,
                related = ?entry.related_id,
                "{}", entry.message
            ),
            Severity::Warning => warn!(
                target: "jobs::runner",
                job = %self.job_id,
                related = ?entry.related_id,
                "{}", entry.message
            ),
            Severity::Error => error!(
                target: "jobs::runner",
                job = %self.job_id,
                related = ?entry.related_id,
                "{}", entry.message
            ),
        }
        self.publish(state, JobEvent::Log { entry });
    }

    fn notify(
        &self,
        stage: NotificationStage,
        processed: usize,
        requested: usize,
        extra: Option<String>,
    ) {
        let mut notification =
            Notification::new(self.job_id, stage, processed, requested);
        if let Some(extra) = extra {
            notification = notification.with_extra(extra);
        }
        self.notifier.notify(self.notify_target.as_ref(), notification);
    }

    /// `pending -> processing`.
    pub(crate) fn start(&self) -> Result<(), JobControlError> {
        let requested = {
            let mut state = self.state.lock();
            if state.status != JobStatus::Pending {
                return Err(JobControlError::InvalidTransition {
                    action: "start",
                    status: state.status,
                });
            }
            state.status = JobStatus::Processing;
            let requested = state.queue.len();
            self.log(
                &mut state,
                LogEntry::info(format!(
                    "Started processing {requested} identifiers"
                )),
            );
            requested
        };
        self.notify(NotificationStage::Started, 0, requested, None);
        Ok(())
    }

    /// Drains the queue one identifier at a time until the job is terminal.
    pub(crate) async fn drive(
        self: Arc<Self>,
        processor: Arc<dyn ItemProcessor>,
    ) {
        loop {
            match self.next_step() {
                Step::Process { index, id } => {
                    let item_processor = Arc::clone(&processor);
                    let item_id = id.clone();
                    let task = tokio::spawn(async move {
                        item_processor.process_item(&item_id).await
                    });
                    let recorded = match task.await {
                        Ok(outcome) => self.record_outcome(index, outcome),
                        Err(join_error) => Err(JobFault::ItemTask {
                            id,
                            reason: join_error.to_string(),
                        }),
                    };
                    if let Err(fault) = recorded {
                        self.fail(fault).await;
                        return;
                    }
                    tokio::task::yield_now().await;
                }
                Step::Wait => self.wake.notified().await,
                Step::Finish { stopped_early } => {
                    self.finish(stopped_early).await;
                    return;
                }
                Step::Fault(fault) => {
                    self.fail(fault).await;
                    return;
                }
                Step::Exit => return,
            }
        }
    }

    fn next_step(&self) -> Step {
        let mut state = self.state.lock();
        match state.status {
            JobStatus::Processing => {
                if state.pause_requested {
                    state.pause_requested = false;
                    state.status = JobStatus::Paused;
                    let cursor = state.cursor;
                    let requested = state.queue.len();
                    self.publish(&mut state, JobEvent::Paused { cursor });
                    self.log(
                        &mut state,
                        LogEntry::info(format!(
                            "Paused after {cursor} of {requested} identifiers"
                        )),
                    );
                    drop(state);
                    self.notify(
                        NotificationStage::Paused,
                        cursor,
                        requested,
                        None,
                    );
                    Step::Wait
                } else if state.results.len() != state.cursor {
                    Step::Fault(JobFault::CursorDrift {
                        cursor: state.cursor,
                        results: state.results.len(),
                    })
                } else if state.cursor >= state.queue.len() {
                    Step::Finish {
                        stopped_early: false,
                    }
                } else {
                    Step::Process {
                        index: state.cursor,
                        id: state.queue[state.cursor].clone(),
                    }
                }
            }
            JobStatus::Paused => Step::Wait,
            JobStatus::Stopping => Step::Finish {
                stopped_early: true,
            },
            JobStatus::Pending => Step::Fault(JobFault::NotStarted),
            JobStatus::Complete | JobStatus::Error => Step::Exit,
        }
    }

    fn record_outcome(
        &self,
        index: usize,
        outcome: ItemOutcome,
    ) -> Result<(), JobFault> {
        let mut state = self.state.lock();
        let expected = state.queue.get(index).cloned();
        let matches_queue = expected.as_deref() == Some(outcome.id.as_str());
        if index != state.cursor || !matches_queue {
            return Err(JobFault::OrderingViolation {
                index,
                expected,
                got: outcome.id,
            });
        }

        state.results.push(outcome.clone());
        state.cursor += 1;
        let processed = state.cursor;
        let requested = state.queue.len();

        self.log(&mut state, describe_outcome(&outcome));
        self.publish(
            &mut state,
            JobEvent::ItemCompleted {
                index,
                outcome,
                processed,
                requested,
            },
        );
        Ok(())
    }

    async fn finish(self: &Arc<Self>, stopped_early: bool) {
        let (final_report, results) = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return;
            }
            let report =
                build_report(state.queue.len(), &state.results, stopped_early);
            let summary = &report.summary;
            let message = if stopped_early {
                format!(
                    "Stopped early: {} of {} identifiers processed, {} skipped",
                    summary.processed, summary.requested, summary.skipped
                )
            } else {
                format!(
                    "Complete: {} processed, {} clean, {} flagged, {} errors",
                    summary.processed,
                    summary.clean,
                    summary.flagged,
                    summary.stage1_errors + summary.stage2_errors
                )
            };
            let final_report = self.settle(
                &mut state,
                JobStatus::Complete,
                stopped_early,
                None,
                report,
            );
            self.log(&mut state, LogEntry::new(message, Severity::Success));
            self.publish(
                &mut state,
                JobEvent::Complete {
                    result: final_report.clone(),
                },
            );
            self.publish(&mut state, JobEvent::StreamEnd);
            (final_report, state.results.clone())
        };

        let summary = &final_report.report.summary;
        info!(
            target: "jobs::summary",
            job = %self.job_id,
            requested = summary.requested,
            processed = summary.processed,
            clean = summary.clean,
            flagged = summary.flagged,
            stage1_errors = summary.stage1_errors,
            stage2_errors = summary.stage2_errors,
            stopped_early,
            "job complete"
        );

        let stage = if stopped_early {
            NotificationStage::StoppedEarly
        } else {
            NotificationStage::Complete
        };
        self.notify(
            stage,
            summary.processed,
            summary.requested,
            Some(format!(
                "clean={} flagged={} total_value={:.2}",
                summary.clean, summary.flagged, summary.total_value
            )),
        );
        self.persist(&results).await;
        self.arm_cleanup();
    }

    /// Orchestration fault: terminal, results kept, never retried.
    async fn fail(self: &Arc<Self>, fault: JobFault) {
        let reason = fault.to_string();
        let (processed, requested, results) = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return;
            }
            let report = build_report(state.queue.len(), &state.results, false);
            let final_report = self.settle(
                &mut state,
                JobStatus::Error,
                false,
                Some(reason.clone()),
                report,
            );
            self.log(
                &mut state,
                LogEntry::new(format!("Job failed: {reason}"), Severity::Error),
            );
            self.publish(
                &mut state,
                JobEvent::Failed {
                    reason: reason.clone(),
                    result: final_report,
                },
            );
            self.publish(&mut state, JobEvent::StreamEnd);
            (state.cursor, state.queue.len(), state.results.clone())
        };

        self.notify(
            NotificationStage::Failed,
            processed,
            requested,
            Some(reason),
        );
        self.persist(&results).await;
        self.arm_cleanup();
    }

    fn settle(
        &self,
        state: &mut JobRunState,
        status: JobStatus,
        stopped_early: bool,
        failure: Option<String>,
        report: Report,
    ) -> FinalReport {
        let finished_at = Utc::now();
        let final_report = FinalReport {
            job_id: self.job_id,
            status,
            stopped_early,
            failure,
            report,
            finished_at,
        };
        state.status = status;
        state.pause_requested = false;
        state.terminal_at = Some(finished_at);
        state.final_report = Some(final_report.clone());
        final_report
    }

    async fn persist(&self, results: &[ItemOutcome]) {
        if results.is_empty() {
            return;
        }
        if let Err(err) = self.history.merge_outcomes(results).await {
            warn!(
                target: "jobs::runner",
                job = %self.job_id,
                error = %err,
                "failed to merge job results into history"
            );
        }
    }

    pub(crate) fn pause(&self) -> Result<JobStatus, JobControlError> {
        let mut state = self.state.lock();
        match state.status {
            JobStatus::Processing => {
                if !state.pause_requested {
                    state.pause_requested = true;
                    self.log(
                        &mut state,
                        LogEntry::info(
                            "Pause requested; finishing the current identifier",
                        ),
                    );
                }
                Ok(JobStatus::Processing)
            }
            status if status.is_terminal() => Err(JobControlError::JobTerminal),
            status => Err(JobControlError::InvalidTransition {
                action: "pause",
                status,
            }),
        }
    }

    /// `paused -> processing`. A pause that has not taken effect yet is not
    /// a paused job, so resuming it is rejected.
    pub(crate) fn resume(&self) -> Result<JobStatus, JobControlError> {
        let (cursor, requested) = {
            let mut state = self.state.lock();
            match state.status {
                JobStatus::Paused => state.status = JobStatus::Processing,
                status if status.is_terminal() => {
                    return Err(JobControlError::JobTerminal);
                }
                status => {
                    return Err(JobControlError::InvalidTransition {
                        action: "resume",
                        status,
                    });
                }
            }
            let cursor = state.cursor;
            let requested = state.queue.len();
            self.publish(&mut state, JobEvent::Resumed { cursor });
            self.log(
                &mut state,
                LogEntry::info(format!(
                    "Resumed at {cursor} of {requested} identifiers"
                )),
            );
            (cursor, requested)
        };
        self.wake.notify_one();
        self.notify(NotificationStage::Resumed, cursor, requested, None);
        Ok(JobStatus::Processing)
    }

    pub(crate) fn stop(&self) -> Result<JobStatus, JobControlError> {
        let (cursor, requested) = {
            let mut state = self.state.lock();
            match state.status {
                JobStatus::Processing | JobStatus::Paused => {}
                status if status.is_terminal() => {
                    return Err(JobControlError::JobTerminal);
                }
                status => {
                    return Err(JobControlError::InvalidTransition {
                        action: "stop",
                        status,
                    });
                }
            }
            state.status = JobStatus::Stopping;
            state.pause_requested = false;
            let cursor = state.cursor;
            let requested = state.queue.len();
            self.publish(&mut state, JobEvent::Stopping { cursor });
            self.log(
                &mut state,
                LogEntry::warning(format!(
                    "Stop requested at {cursor} of {requested}; \
                     finishing the current identifier"
                )),
            );
            (cursor, requested)
        };
        self.wake.notify_one();
        self.notify(NotificationStage::Stopping, cursor, requested, None);
        Ok(JobStatus::Stopping)
    }

    /// (Re)arms idle cleanup once the job is terminal.
    fn arm_cleanup(self: &Arc<Self>) {
        let mut state = self.state.lock();
        self.schedule_cleanup(&mut state);
    }

    pub(crate) fn schedule_cleanup(self: &Arc<Self>, state: &mut JobRunState) {
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        if let Some(previous) = state.cleanup.take() {
            previous.abort();
        }

        let inner = self.inner.clone();
        let job_id = self.job_id;
        let retention = self.idle_retention;
        let task = runtime.spawn(async move {
            tokio::time::sleep(retention).await;
            if let Some(inner) = inner.upgrade() {
                inner.evict_if_idle(job_id).await;
            }
        });
        state.cleanup = Some(task.abort_handle());
        debug!(
            target: "jobs::cleanup",
            job = %job_id,
            retention_ms = retention.as_millis() as u64,
            "idle cleanup armed"
        );
    }

    pub(crate) fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.status.is_terminal() && state.subscribers == 0
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock();
        JobSnapshot {
            job_id: self.job_id,
            status: state.status,
            cursor: state.cursor,
            requested: state.queue.len(),
            processed: state.results.len(),
            pause_requested: state.pause_requested,
            subscribers: state.subscribers,
            notify_configured: self.notify_target.is_some(),
            created_at: self.created_at,
            terminal_at: state.terminal_at,
        }
    }

    /// Consistent view of status, cursor and a report over the results so far.
    pub(crate) fn partial_report(&self) -> (JobStatus, usize, Report) {
        let state = self.state.lock();
        let stopped_early = state
            .final_report
            .as_ref()
            .map(|report| report.stopped_early)
            .unwrap_or(false);
        (
            state.status,
            state.cursor,
            build_report(state.queue.len(), &state.results, stopped_early),
        )
    }

    pub(crate) fn final_report(&self) -> Option<FinalReport> {
        self.state.lock().final_report.clone()
    }
}

fn describe_outcome(outcome: &ItemOutcome) -> LogEntry {
    let name = &outcome.display_name;
    let entry = match outcome.kind {
        OutcomeKind::VerifiedClean => {
            LogEntry::new(format!("{name}: clean"), Severity::Success)
        }
        OutcomeKind::ValuationSuccess => LogEntry::new(
            format!("{name}: clean, valued at {:.2}", outcome.value),
            Severity::Success,
        ),
        OutcomeKind::VerifiedFlagged => {
            LogEntry::warning(format!("{name}: flagged ({})", outcome.reason))
        }
        OutcomeKind::UpstreamErrorStage1 => LogEntry::new(
            format!("{name}: ban check failed ({})", outcome.reason),
            Severity::Error,
        ),
        OutcomeKind::UpstreamErrorStage2 => LogEntry::warning(format!(
            "{name}: valuation failed ({})",
            outcome.reason
        )),
    };
    entry.with_related(outcome.id.clone())
}

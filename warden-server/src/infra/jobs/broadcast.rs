//! Event fan-out for a single job.
//!
//! Every published event gets the next per-job sequence number and goes to a
//! `tokio::sync::broadcast` channel, so a slow subscriber lags and drops
//! frames instead of blocking the runner or other subscribers. Log events are
//! also buffered on the job so a subscriber attaching later can replay them.

use std::{collections::VecDeque, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::Stream;
use tracing::{debug, warn};
use warden_core::{JobEvent, JobId};

use super::run::{JobRun, JobRunState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFrame {
    pub sequence: u64,
    pub job_id: JobId,
    pub emitted_at: DateTime<Utc>,
    pub event: JobEvent,
}

impl JobFrame {
    pub fn is_stream_end(&self) -> bool {
        matches!(self.event, JobEvent::StreamEnd)
    }
}

impl JobRun {
    /// Sequences and sends one event. Taking the state guard keeps sequence
    /// order, the log buffer and channel order identical.
    pub(crate) fn publish(
        &self,
        state: &mut JobRunState,
        event: JobEvent,
    ) -> JobFrame {
        state.sequence += 1;
        let frame = JobFrame {
            sequence: state.sequence,
            job_id: self.job_id(),
            emitted_at: Utc::now(),
            event,
        };

        match &frame.event {
            JobEvent::Log { .. } => state.logs.push(frame.clone()),
            JobEvent::Complete { .. } | JobEvent::Failed { .. } => {
                state.terminal_frame = Some(frame.clone())
            }
            JobEvent::StreamEnd => state.end_frame = Some(frame.clone()),
            _ => {}
        }

        // No receivers is not an error; history covers late subscribers.
        let _ = self.sender().send(frame.clone());
        frame
    }

    /// Registers a subscriber.
    ///
    /// Buffered logs newer than `last_sequence` are queued for replay. A job
    /// that already finished also replays its terminal event and the
    /// stream-end marker and gets no live receiver. Otherwise the live
    /// receiver is created under the same guard as the replay snapshot, so no
    /// frame is missed or delivered twice.
    pub(crate) fn attach(
        self: &Arc<Self>,
        last_sequence: Option<u64>,
    ) -> JobSubscription {
        let after = last_sequence.unwrap_or(0);
        let mut state = self.state.lock();
        state.subscribers += 1;
        if let Some(cleanup) = state.cleanup.take() {
            cleanup.abort();
            debug!(
                target: "jobs::cleanup",
                job = %self.job_id(),
                "idle cleanup cancelled by new subscriber"
            );
        }

        let mut replay: VecDeque<JobFrame> = state
            .logs
            .iter()
            .filter(|frame| frame.sequence > after)
            .cloned()
            .collect();

        let receiver = if state.status.is_terminal() {
            if let Some(frame) = state
                .terminal_frame
                .as_ref()
                .filter(|frame| frame.sequence > after)
            {
                replay.push_back(frame.clone());
            }
            if let Some(frame) = state.end_frame.as_ref() {
                replay.push_back(frame.clone());
            }
            None
        } else {
            Some(self.sender().subscribe())
        };

        JobSubscription {
            job_id: self.job_id(),
            after,
            replay,
            receiver,
            run: Arc::clone(self),
            finished: false,
        }
    }

    pub(crate) fn detach(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers == 0 && state.status.is_terminal() {
            self.schedule_cleanup(&mut state);
        }
    }
}

/// A live event sink attached to one job.
///
/// Yields the replayed history first, then live frames, and ends after the
/// stream-end marker. Dropping it detaches from the job.
pub struct JobSubscription {
    job_id: JobId,
    after: u64,
    replay: VecDeque<JobFrame>,
    receiver: Option<broadcast::Receiver<JobFrame>>,
    run: Arc<JobRun>,
    finished: bool,
}

impl fmt::Debug for JobSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSubscription")
            .field("job_id", &self.job_id)
            .field("replay_pending", &self.replay.len())
            .field("live", &self.receiver.is_some())
            .field("finished", &self.finished)
            .finish()
    }
}

impl JobSubscription {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub async fn next_frame(&mut self) -> Option<JobFrame> {
        if self.finished {
            return None;
        }

        if let Some(frame) = self.replay.pop_front() {
            self.finished = frame.is_stream_end();
            return Some(frame);
        }

        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(frame) => {
                    if frame.sequence <= self.after && !frame.is_stream_end() {
                        continue;
                    }
                    self.finished = frame.is_stream_end();
                    return Some(frame);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        target: "jobs::broadcast",
                        job = %self.job_id,
                        skipped,
                        "subscriber lagged; frames dropped"
                    );
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = JobFrame> + Send + 'static {
        async_stream::stream! {
            let mut subscription = self;
            while let Some(frame) = subscription.next_frame().await {
                yield frame;
            }
        }
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        self.receiver.take();
        self.run.detach();
    }
}

//! Job Store: owns every live job, creates and starts them, routes control
//! signals, and evicts terminal jobs once nobody has watched them for the
//! idle retention window.

mod broadcast;
mod error;
mod run;

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, instrument};
use url::Url;
use warden_core::{
    FinalReport, HistoryStore, ItemProcessor, JobId, JobStatus, Report,
    dedupe_queue,
};

pub use broadcast::{JobFrame, JobSubscription};
pub use error::{JobControlError, JobFault};

use crate::infra::{config::JobsConfig, notify::Notifier};
use run::{JobRun, JobRunParts};

const DEFAULT_IDLE_RETENTION: Duration = Duration::from_secs(10 * 60);
const DEFAULT_EVENT_BUFFER: usize = 1024;
const DEFAULT_MAX_QUEUE_LEN: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStoreSettings {
    pub idle_retention: Duration,
    pub event_buffer: usize,
    pub max_queue_len: usize,
}

impl Default for JobStoreSettings {
    fn default() -> Self {
        Self {
            idle_retention: DEFAULT_IDLE_RETENTION,
            event_buffer: DEFAULT_EVENT_BUFFER,
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
        }
    }
}

impl From<&JobsConfig> for JobStoreSettings {
    fn from(config: &JobsConfig) -> Self {
        Self {
            idle_retention: config.idle_retention,
            event_buffer: config.event_buffer,
            max_queue_len: config.max_queue_len,
        }
    }
}

/// Read model for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub cursor: usize,
    pub requested: usize,
    pub processed: usize,
    pub pause_requested: bool,
    pub subscribers: usize,
    pub notify_configured: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCreated {
    pub job_id: JobId,
    pub requested: usize,
    pub duplicates_removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCommandAccepted {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub cursor: usize,
    pub report: Report,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Finished(FinalReport),
    Running {
        job_id: JobId,
        status: JobStatus,
        processed: usize,
        requested: usize,
    },
}

/// Command dispatcher and read model for batch jobs.
#[derive(Clone)]
pub struct JobControlPlane {
    inner: Arc<JobControlPlaneInner>,
}

impl fmt::Debug for JobControlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let jobs = self.inner.jobs.try_read().ok().map(|guard| guard.len());
        f.debug_struct("JobControlPlane")
            .field("jobs", &jobs)
            .field("settings", &self.inner.settings)
            .field("notifier", &self.inner.notifier)
            .finish()
    }
}

pub(crate) struct JobControlPlaneInner {
    jobs: RwLock<HashMap<JobId, Arc<JobRun>>>,
    processor: Arc<dyn ItemProcessor>,
    history: Arc<dyn HistoryStore>,
    notifier: Notifier,
    settings: JobStoreSettings,
}

impl JobControlPlaneInner {
    /// Removes the job if it is still terminal with nobody attached.
    pub(crate) async fn evict_if_idle(&self, job_id: JobId) {
        let mut jobs = self.jobs.write().await;
        let idle = jobs.get(&job_id).map(|run| run.is_idle()).unwrap_or(false);
        if idle {
            jobs.remove(&job_id);
            info!(
                target: "jobs::cleanup",
                job = %job_id,
                remaining = jobs.len(),
                "evicted idle job"
            );
        }
    }
}

impl JobControlPlane {
    pub fn new(
        processor: Arc<dyn ItemProcessor>,
        history: Arc<dyn HistoryStore>,
        notifier: Notifier,
        settings: JobStoreSettings,
    ) -> Self {
        Self {
            inner: Arc::new(JobControlPlaneInner {
                jobs: RwLock::new(HashMap::new()),
                processor,
                history,
                notifier,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> JobStoreSettings {
        self.inner.settings
    }

    /// Normalizes the queue, registers the job, starts it and spawns its
    /// runner. The job is `processing` by the time this returns.
    #[instrument(skip(self, ids, notify_target), fields(requested = ids.len()))]
    pub async fn create_job(
        &self,
        ids: Vec<String>,
        notify_target: Option<&str>,
    ) -> Result<JobCreated, JobControlError> {
        let submitted = ids.len();
        let queue = dedupe_queue(ids);
        if queue.is_empty() {
            return Err(JobControlError::EmptyQueue);
        }
        let limit = self.inner.settings.max_queue_len;
        if queue.len() > limit {
            return Err(JobControlError::QueueTooLarge {
                len: queue.len(),
                limit,
            });
        }
        let notify_target = notify_target
            .map(str::trim)
            .filter(|target| !target.is_empty())
            .map(parse_notify_target)
            .transpose()?;

        let requested = queue.len();
        let run = JobRun::new(JobRunParts {
            queue,
            notify_target,
            idle_retention: self.inner.settings.idle_retention,
            event_buffer: self.inner.settings.event_buffer,
            notifier: self.inner.notifier.clone(),
            history: Arc::clone(&self.inner.history),
            inner: Arc::downgrade(&self.inner),
        });
        let job_id = run.job_id();

        self.inner
            .jobs
            .write()
            .await
            .insert(job_id, Arc::clone(&run));

        run.start()?;
        tokio::spawn(Arc::clone(&run).drive(Arc::clone(&self.inner.processor)));

        info!(
            target: "jobs::runner",
            job = %job_id,
            requested,
            duplicates_removed = submitted - requested,
            "job created"
        );

        Ok(JobCreated {
            job_id,
            requested,
            duplicates_removed: submitted - requested,
        })
    }

    async fn run(&self, job_id: JobId) -> Result<Arc<JobRun>, JobControlError> {
        self.inner
            .jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(JobControlError::JobNotFound)
    }

    pub async fn contains(&self, job_id: JobId) -> bool {
        self.inner.jobs.read().await.contains_key(&job_id)
    }

    pub async fn job_count(&self) -> usize {
        self.inner.jobs.read().await.len()
    }

    pub async fn get(
        &self,
        job_id: JobId,
    ) -> Result<JobSnapshot, JobControlError> {
        Ok(self.run(job_id).await?.snapshot())
    }

    /// All retained jobs, oldest first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let runs: Vec<Arc<JobRun>> =
            self.inner.jobs.read().await.values().cloned().collect();
        let mut snapshots: Vec<JobSnapshot> =
            runs.iter().map(|run| run.snapshot()).collect();
        snapshots.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then(a.job_id.cmp(&b.job_id))
        });
        snapshots
    }

    /// Attaches a subscriber. `last_sequence` skips frames the caller has
    /// already seen.
    pub async fn subscribe(
        &self,
        job_id: JobId,
        last_sequence: Option<u64>,
    ) -> Result<JobSubscription, JobControlError> {
        Ok(self.run(job_id).await?.attach(last_sequence))
    }

    #[instrument(skip(self))]
    pub async fn pause(
        &self,
        job_id: JobId,
    ) -> Result<JobCommandAccepted, JobControlError> {
        let status = self.run(job_id).await?.pause()?;
        Ok(JobCommandAccepted { job_id, status })
    }

    #[instrument(skip(self))]
    pub async fn resume(
        &self,
        job_id: JobId,
    ) -> Result<JobCommandAccepted, JobControlError> {
        let status = self.run(job_id).await?.resume()?;
        Ok(JobCommandAccepted { job_id, status })
    }

    #[instrument(skip(self))]
    pub async fn stop(
        &self,
        job_id: JobId,
    ) -> Result<JobCommandAccepted, JobControlError> {
        let status = self.run(job_id).await?.stop()?;
        Ok(JobCommandAccepted { job_id, status })
    }

    pub async fn partial_report(
        &self,
        job_id: JobId,
    ) -> Result<PartialReport, JobControlError> {
        let (status, cursor, report) = self.run(job_id).await?.partial_report();
        Ok(PartialReport {
            job_id,
            status,
            cursor,
            report,
        })
    }

    pub async fn result(
        &self,
        job_id: JobId,
    ) -> Result<JobResult, JobControlError> {
        let run = self.run(job_id).await?;
        if let Some(report) = run.final_report() {
            return Ok(JobResult::Finished(report));
        }
        let snapshot = run.snapshot();
        Ok(JobResult::Running {
            job_id,
            status: snapshot.status,
            processed: snapshot.processed,
            requested: snapshot.requested,
        })
    }
}

fn parse_notify_target(raw: &str) -> Result<Url, JobControlError> {
    let url = Url::parse(raw)
        .map_err(|err| JobControlError::InvalidNotifyTarget(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(JobControlError::InvalidNotifyTarget(format!(
            "unsupported scheme {other}"
        ))),
    }
}

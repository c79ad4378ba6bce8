//! Best-effort side-channel notifications on job lifecycle transitions.
//!
//! Delivery runs on a detached task bounded by a timeout. The runner never
//! waits for it, failures only produce a warning, and nothing is retried.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;
use warden_core::{JobId, NotificationStage};

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub job_id: JobId,
    pub stage: NotificationStage,
    pub message: String,
    pub processed: usize,
    pub requested: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl Notification {
    pub fn new(
        job_id: JobId,
        stage: NotificationStage,
        processed: usize,
        requested: usize,
    ) -> Self {
        let message = match stage {
            NotificationStage::Started => {
                format!("Job {job_id} started with {requested} identifiers")
            }
            NotificationStage::Paused => {
                format!("Job {job_id} paused at {processed}/{requested}")
            }
            NotificationStage::Resumed => {
                format!("Job {job_id} resumed at {processed}/{requested}")
            }
            NotificationStage::Stopping => {
                format!("Job {job_id} stopping at {processed}/{requested}")
            }
            NotificationStage::StoppedEarly => format!(
                "Job {job_id} stopped early after {processed}/{requested}"
            ),
            NotificationStage::Complete => {
                format!("Job {job_id} complete: {processed}/{requested}")
            }
            NotificationStage::Failed => {
                format!("Job {job_id} failed at {processed}/{requested}")
            }
        };
        Self {
            job_id,
            stage,
            message,
            processed,
            requested,
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// Transport for a single notification.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(
        &self,
        target: &Url,
        notification: &Notification,
    ) -> anyhow::Result<()>;
}

/// Posts the notification as JSON to the target URL.
#[derive(Debug, Clone, Default)]
pub struct WebhookSink {
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(
        &self,
        target: &Url,
        notification: &Notification,
    ) -> anyhow::Result<()> {
        self.client
            .post(target.clone())
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
    timeout: Duration,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("enabled", &self.sink.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, timeout: Duration) -> Self {
        Self {
            sink: Some(sink),
            timeout,
        }
    }

    pub fn disabled() -> Self {
        Self {
            sink: None,
            timeout: Duration::ZERO,
        }
    }

    /// Fire-and-forget. Returns immediately; the outcome is only logged.
    pub fn notify(&self, target: Option<&Url>, notification: Notification) {
        let (Some(sink), Some(target)) = (self.sink.as_ref(), target) else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!(
                target: "jobs::notify",
                job = %notification.job_id,
                stage = notification.stage.as_str(),
                "no runtime available; notification dropped"
            );
            return;
        };

        let sink = Arc::clone(sink);
        let target = target.clone();
        let timeout = self.timeout;
        runtime.spawn(async move {
            let job = notification.job_id;
            let stage = notification.stage.as_str();
            match tokio::time::timeout(
                timeout,
                sink.deliver(&target, &notification),
            )
            .await
            {
                Ok(Ok(())) => {
                    debug!(
                        target: "jobs::notify",
                        %job,
                        stage,
                        "notification delivered"
                    )
                }
                Ok(Err(err)) => warn!(
                    target: "jobs::notify",
                    %job,
                    stage,
                    error = %err,
                    "notification delivery failed"
                ),
                Err(_) => warn!(
                    target: "jobs::notify",
                    %job,
                    stage,
                    timeout_ms = timeout.as_millis() as u64,
                    "notification delivery timed out"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct ChannelSink(mpsc::UnboundedSender<Notification>);

    #[async_trait]
    impl NotificationSink for ChannelSink {
        async fn deliver(
            &self,
            _target: &Url,
            notification: &Notification,
        ) -> anyhow::Result<()> {
            let _ = self.0.send(notification.clone());
            Ok(())
        }
    }

    struct HangingSink;

    #[async_trait]
    impl NotificationSink for HangingSink {
        async fn deliver(
            &self,
            _target: &Url,
            _notification: &Notification,
        ) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn target() -> Url {
        Url::parse("http://hooks.invalid/notify").expect("valid url")
    }

    #[tokio::test]
    async fn delivers_when_target_configured() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier =
            Notifier::new(Arc::new(ChannelSink(tx)), Duration::from_secs(1));
        let job_id = JobId::new();

        notifier.notify(
            Some(&target()),
            Notification::new(job_id, NotificationStage::Started, 0, 3),
        );

        let delivered = rx.recv().await.expect("notification delivered");
        assert_eq!(delivered.job_id, job_id);
        assert_eq!(delivered.stage, NotificationStage::Started);
        assert_eq!(delivered.requested, 3);
    }

    #[tokio::test]
    async fn skips_without_target() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier =
            Notifier::new(Arc::new(ChannelSink(tx)), Duration::from_secs(1));

        notifier.notify(
            None,
            Notification::new(JobId::new(), NotificationStage::Complete, 1, 1),
        );
        drop(notifier);

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn hanging_sink_does_not_block_caller() {
        let notifier =
            Notifier::new(Arc::new(HangingSink), Duration::from_millis(20));
        let started = std::time::Instant::now();
        notifier.notify(
            Some(&target()),
            Notification::new(JobId::new(), NotificationStage::Paused, 1, 2),
        );
        assert!(started.elapsed() < Duration::from_millis(20));
    }
}

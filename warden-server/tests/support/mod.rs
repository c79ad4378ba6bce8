#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use url::Url;
use warden_core::{FinalReport, ItemOutcome, ItemProcessor, JobId, JobStatus};
use warden_server::infra::{
    jobs::{JobControlPlane, JobResult},
    notify::{Notification, NotificationSink},
};

pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Returns a fixed outcome per identifier; unknown identifiers are valued at 1.
#[derive(Default)]
pub struct ScriptedProcessor {
    script: HashMap<String, ItemOutcome>,
    calls: std::sync::Mutex<Vec<String>>,
    count: AtomicUsize,
}

impl ScriptedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, outcome: ItemOutcome) -> Self {
        self.script.insert(outcome.id.clone(), outcome);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemProcessor for ScriptedProcessor {
    async fn process_item(&self, id: &str) -> ItemOutcome {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(id.to_string());
        }
        self.script
            .get(id)
            .cloned()
            .unwrap_or_else(|| ItemOutcome::valued(id, None, 1.0))
    }
}

/// Blocks every item until the test releases a permit, reporting each
/// identifier as it enters.
pub struct GatedProcessor {
    gate: Semaphore,
    entered: mpsc::UnboundedSender<String>,
}

impl GatedProcessor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (entered, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                gate: Semaphore::new(0),
                entered,
            }),
            rx,
        )
    }

    pub fn release(&self, items: usize) {
        self.gate.add_permits(items);
    }
}

#[async_trait]
impl ItemProcessor for GatedProcessor {
    async fn process_item(&self, id: &str) -> ItemOutcome {
        let _ = self.entered.send(id.to_string());
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        ItemOutcome::valued(id, None, 2.0)
    }
}

/// Panics on one identifier.
pub struct PanickingProcessor {
    pub poison: String,
}

#[async_trait]
impl ItemProcessor for PanickingProcessor {
    async fn process_item(&self, id: &str) -> ItemOutcome {
        if id == self.poison {
            panic!("processor blew up on {id}");
        }
        ItemOutcome::clean(id, None)
    }
}

pub struct RecordingSink {
    tx: mpsc::UnboundedSender<(Url, Notification)>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(Url, Notification)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(
        &self,
        target: &Url,
        notification: &Notification,
    ) -> anyhow::Result<()> {
        let _ = self.tx.send((target.clone(), notification.clone()));
        Ok(())
    }
}

/// Counts delivery attempts and fails every one of them.
#[derive(Default)]
pub struct FailingSink {
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for FailingSink {
    async fn deliver(
        &self,
        _target: &Url,
        _notification: &Notification,
    ) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("webhook endpoint unreachable")
    }
}

pub fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

pub async fn next_entered(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(WAIT_LIMIT, rx.recv())
        .await
        .expect("processor entered in time")
        .expect("processor channel open")
}

pub async fn wait_for_status(
    plane: &JobControlPlane,
    job_id: JobId,
    status: JobStatus,
) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        let snapshot = plane.get(job_id).await.expect("job exists");
        if snapshot.status == status {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job stuck in {} waiting for {}",
            snapshot.status,
            status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_result(
    plane: &JobControlPlane,
    job_id: JobId,
) -> FinalReport {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        if let JobResult::Finished(report) =
            plane.result(job_id).await.expect("job exists")
        {
            return report;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job did not finish in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out: {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

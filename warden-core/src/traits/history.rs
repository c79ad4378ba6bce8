use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{Result, types::outcome::ItemOutcome};

/// Durable record of per-identifier outcomes across jobs.
///
/// Called once per job when it completes, is stopped, or fails. Outcomes are
/// merged by identifier: a newer outcome replaces the stored one, other
/// identifiers are left untouched.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn merge_outcomes(&self, outcomes: &[ItemOutcome]) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<ItemOutcome>>;
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<HashMap<String, ItemOutcome>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn merge_outcomes(&self, outcomes: &[ItemOutcome]) -> Result<()> {
        let mut guard = self.records.write().await;
        for outcome in outcomes {
            guard.insert(outcome.id.clone(), outcome.clone());
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ItemOutcome>> {
        Ok(self.records.read().await.get(id).cloned())
    }
}

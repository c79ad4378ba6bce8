//! JSON-file history store.
//!
//! All outcomes live in one JSON object keyed by identifier. Each merge reads
//! the file, overlays the new outcomes, and replaces the file through a
//! sibling temp file and a rename.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs, sync::Mutex};
use tracing::debug;
use warden_core::{HistoryStore, ItemOutcome, Result, WardenError};

type HistoryMap = BTreeMap<String, ItemOutcome>;

#[derive(Debug)]
pub struct JsonFileHistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HistoryMap> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {
                Ok(HistoryMap::new())
            }
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(HistoryMap::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_all(&self, records: &HistoryMap) -> Result<()> {
        if let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).await?;
        }

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| {
                WardenError::Internal(format!(
                    "history path {} has no file name",
                    self.path.display()
                ))
            })?
            .to_string_lossy()
            .into_owned();
        let tmp = self.path.with_file_name(format!(".{file_name}.tmp"));

        let bytes = serde_json::to_vec_pretty(records)?;
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    async fn merge_outcomes(&self, outcomes: &[ItemOutcome]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        for outcome in outcomes {
            records.insert(outcome.id.clone(), outcome.clone());
        }
        self.write_all(&records).await?;
        debug!(
            path = %self.path.display(),
            merged = outcomes.len(),
            total = records.len(),
            "history updated"
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ItemOutcome>> {
        let _guard = self.write_lock.lock().await;
        Ok(self.read_all().await?.remove(id))
    }
}

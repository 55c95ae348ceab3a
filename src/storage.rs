//! Per-user book persistence with whole-list read and replace.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::BookRecord;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_records(&self, user_id: &str) -> Result<Vec<BookRecord>>;
    async fn save_all(&self, user_id: &str, records: Vec<BookRecord>) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, Vec<BookRecord>>>,
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_records(&self, user_id: &str) -> Result<Vec<BookRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_all(&self, user_id: &str, records: Vec<BookRecord>) -> Result<()> {
        self.records
            .write()
            .await
            .insert(user_id.to_string(), records);
        Ok(())
    }
}

/// One `books_<user>.json` file per user under the data directory.
pub struct JsonFileRecordStore {
    dir: PathBuf,
}

impl JsonFileRecordStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create record directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("books_{}.json", file_key(user_id)))
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn list_records(&self, user_id: &str) -> Result<Vec<BookRecord>> {
        let path = self.path_for(user_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read records {}", path.display()));
            }
        };
        serde_json::from_slice(&raw).with_context(|| format!("parse records {}", path.display()))
    }

    async fn save_all(&self, user_id: &str, records: Vec<BookRecord>) -> Result<()> {
        let path = self.path_for(user_id);
        let json = serde_json::to_vec_pretty(&records).context("serialize records")?;

        // write then rename so readers never see a half-written list
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("write records {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replace records {}", path.display()))?;
        tracing::debug!("saved {} records to {}", records.len(), path.display());
        Ok(())
    }
}

/// Keeps user ids from escaping the record directory.
fn file_key(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

//! Persisted summary cache stored as a single pretty-printed JSON document

use crate::atomic_writer::AtomicWriter;
use crate::traits::{StorageResult, SummaryStore};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokenmeter_core::CachedSummary;

pub struct JsonSummaryStore {
    path: PathBuf,
}

impl JsonSummaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SummaryStore for JsonSummaryStore {
    async fn load(&self) -> StorageResult<Option<CachedSummary>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save(&self, cached: &CachedSummary) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(cached)?;

        let mut writer = AtomicWriter::new(&self.path).await?;
        writer.write(&json).await?;
        writer.commit().await
    }

    async fn clear(&self) -> StorageResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

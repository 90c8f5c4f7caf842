//! Atomic file writer to ensure safe file operations

use crate::traits::StorageResult;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Atomic file writer that writes to a temporary file and renames on success
pub struct AtomicWriter {
    temp_path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl AtomicWriter {
    /// Create a new atomic writer for the given path
    pub async fn new<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let final_path = path.as_ref().to_path_buf();

        if let Some(parent) = final_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = Self::temp_path(&final_path);
        let file = File::create(&temp_path).await?;

        Ok(Self {
            temp_path,
            final_path,
            file: Some(file),
            committed: false,
        })
    }

    /// Write data to the temporary file
    pub async fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(data).await?;
        }
        Ok(())
    }

    /// Commit the write by renaming the temp file to the final path
    pub async fn commit(mut self) -> StorageResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        fs::rename(&self.temp_path, &self.final_path).await?;
        self.committed = true;

        Ok(())
    }

    /// Temporary sibling used until commit: `<path>.tmp`
    pub fn temp_path(final_path: &Path) -> PathBuf {
        let mut temp = final_path.as_os_str().to_owned();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        if !self.committed {
            // Close the handle before unlinking
            self.file.take();
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

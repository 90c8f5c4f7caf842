//! JSONL event log
//!
//! One JSON-encoded [`UsageEvent`] per line. Appends are a single write on a
//! file opened in append mode, so concurrent writers never interleave within a
//! line. Reads are lazy and tolerate malformed or truncated lines.

use crate::atomic_writer::AtomicWriter;
use crate::traits::{EventStore, EventStream, StorageResult, TrimStats};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokenmeter_core::{EventFilter, UsageEvent};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Take};
use tracing::{debug, info, warn};

/// Event store backed by a single newline-delimited JSON file
pub struct JsonlEventStore {
    path: PathBuf,
}

impl JsonlEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the log for reading, `None` when it does not exist yet
    async fn open(&self) -> StorageResult<Option<File>> {
        match File::open(&self.path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Line-at-a-time decoder driving the event stream
struct LineReader {
    reader: BufReader<Take<File>>,
    buf: Vec<u8>,
    line: u64,
    filter: EventFilter,
}

impl LineReader {
    async fn next_event(&mut self) -> Option<UsageEvent> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!(line = self.line + 1, error = %e, "Failed to read usage log");
                    return None;
                }
            }
            self.line += 1;

            let line = self.buf.trim_ascii();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_slice::<UsageEvent>(line) {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(e) => {
                    warn!(line = self.line, error = %e, "Skipping malformed usage log line");
                }
            }
        }
    }
}

#[async_trait]
impl EventStore for JsonlEventStore {
    async fn append(&self, event: &UsageEvent) -> StorageResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }

    async fn read(&self, filter: EventFilter) -> StorageResult<EventStream> {
        let Some(file) = self.open().await? else {
            debug!(path = %self.path.display(), "Usage log not found, nothing to read");
            return Ok(stream::empty().boxed());
        };

        // Lines appended after this point are not part of this read
        let len = file.metadata().await?.len();
        let reader = LineReader {
            reader: BufReader::new(file.take(len)),
            buf: Vec::new(),
            line: 0,
            filter,
        };

        let events = stream::unfold(reader, |mut reader| async move {
            let event = reader.next_event().await?;
            Some((event, reader))
        });

        Ok(events.boxed())
    }

    async fn trim(&self, cutoff: i64) -> StorageResult<TrimStats> {
        let started = Instant::now();

        let Some(file) = self.open().await? else {
            return Ok(TrimStats::default());
        };

        let mut reader = BufReader::new(file);
        let mut writer = AtomicWriter::new(&self.path).await?;
        let mut buf = Vec::new();
        let mut line_number = 0u64;
        let mut stats = TrimStats::default();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            line_number += 1;

            let line = buf.trim_ascii();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_slice::<UsageEvent>(line) {
                Ok(event) if event.timestamp >= cutoff => {
                    writer.write(line).await?;
                    writer.write(b"\n").await?;
                    stats.kept += 1;
                }
                Ok(_) => stats.removed += 1,
                Err(e) => {
                    warn!(line = line_number, error = %e, "Dropping malformed usage log line during trim");
                }
            }
        }

        drop(reader);
        writer.commit().await?;
        stats.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            kept = stats.kept,
            removed = stats.removed,
            duration_ms = stats.duration_ms,
            "Trimmed usage log"
        );

        Ok(stats)
    }

    async fn clear(&self) -> StorageResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

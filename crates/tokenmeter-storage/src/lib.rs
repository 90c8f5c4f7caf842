//! Tokenmeter Storage
//!
//! This crate provides the on-disk stores used by the monitor:
//! - Event store (append-only JSONL log with lazy reads and atomic trim)
//! - Summary store (persisted summary cache)
//! - Atomic writer shared by both

pub mod atomic_writer;
pub mod event_log;
pub mod summary_file;
pub mod traits;

pub use atomic_writer::AtomicWriter;
pub use event_log::JsonlEventStore;
pub use summary_file::JsonSummaryStore;
pub use traits::{EventStore, EventStream, StorageError, StorageResult, SummaryStore, TrimStats};

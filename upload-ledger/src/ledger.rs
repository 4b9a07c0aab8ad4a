//! The `Ledger` abstraction and its in-memory implementation.
//!
//! A ledger is an observable collection keyed by record identity. Every
//! watcher sees the full current state when it subscribes and again after
//! each successful write.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

use crate::model::{AppUploadStatus, StatusKind, Upload};

/// A live sequence of full ledger snapshots. Never terminates on its own.
pub type SnapshotStream<R> = BoxStream<'static, Vec<R>>;

/// Error types for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The backing store rejected or failed the write
    #[error("Storage error: {0}")]
    Storage(String),

    /// The ledger is not accepting operations
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Identity and the status field change detection looks at.
pub trait Record: Clone + Send + Sync + 'static {
    /// The field compared between snapshots.
    type Status: PartialEq + Send;

    /// Identity key. Writes replace any record with the same key.
    fn key(&self) -> &str;

    /// Current status.
    fn status(&self) -> Self::Status;
}

impl Record for Upload {
    type Status = StatusKind;

    fn key(&self) -> &str {
        &self.checksum
    }

    fn status(&self) -> StatusKind {
        self.kind()
    }
}

impl Record for AppUploadStatus {
    type Status = bool;

    fn key(&self) -> &str {
        &self.checksum
    }

    fn status(&self) -> bool {
        self.uploaded
    }
}

/// Persisted, observable collection of records.
#[async_trait]
pub trait Ledger<R: Record>: Send + Sync {
    /// Subscribe to snapshots: the current state first, then one per write.
    fn observe(&self) -> SnapshotStream<R>;

    /// Insert or replace the record with the same key.
    async fn upsert(&self, record: R) -> Result<(), LedgerError>;

    /// Remove the record with the same key.
    async fn remove(&self, record: &R) -> Result<(), LedgerError>;

    /// Read the current state once.
    async fn snapshot(&self) -> Vec<R> {
        self.observe().next().await.unwrap_or_default()
    }
}

/// Ledger of in-flight uploads.
pub type UploadLedger = dyn Ledger<Upload>;

/// Ledger of per-app upload flags.
pub type AppStatusLedger = dyn Ledger<AppUploadStatus>;

/// In-memory ledger backed by a watch channel.
///
/// The record list lives inside the channel, so every write is applied under
/// the channel lock and published atomically. Insertion order is preserved.
pub struct MemoryLedger<R: Record> {
    state: watch::Sender<Vec<R>>,
}

impl<R: Record> MemoryLedger<R> {
    /// Create an empty ledger.
    pub fn new() -> Self {
        let (state, _) = watch::channel(Vec::new());
        Self { state }
    }

    /// Create a ledger pre-populated with `records`. Later duplicates win.
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let mut initial: Vec<R> = Vec::new();
        for record in records {
            put(&mut initial, record);
        }
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    /// Look up a record by key.
    pub fn get(&self, key: &str) -> Option<R> {
        self.state.borrow().iter().find(|r| r.key() == key).cloned()
    }
}

impl<R: Record> Default for MemoryLedger<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> Ledger<R> for MemoryLedger<R> {
    fn observe(&self) -> SnapshotStream<R> {
        WatchStream::new(self.state.subscribe()).boxed()
    }

    async fn upsert(&self, record: R) -> Result<(), LedgerError> {
        trace!(key = %record.key(), "Ledger upsert");
        self.state.send_modify(|records| put(records, record));
        Ok(())
    }

    async fn remove(&self, record: &R) -> Result<(), LedgerError> {
        let key = record.key();
        let removed = self.state.send_if_modified(|records| {
            let before = records.len();
            records.retain(|r| r.key() != key);
            records.len() != before
        });
        trace!(key = %key, removed, "Ledger remove");
        Ok(())
    }
}

fn put<R: Record>(records: &mut Vec<R>, record: R) {
    match records.iter_mut().find(|r| r.key() == record.key()) {
        Some(slot) => *slot = record,
        None => records.push(record),
    }
}

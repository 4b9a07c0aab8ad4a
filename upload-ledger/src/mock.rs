//! Ledger wrapper that fails writes on demand.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use crate::ledger::{Ledger, LedgerError, MemoryLedger, Record, SnapshotStream};

/// [`MemoryLedger`] whose writes can be made to fail.
///
/// `fail_next_writes(n)` rejects the next `n` writes with a storage error;
/// `set_unavailable(true)` rejects every write until cleared. Reads and
/// subscriptions are never affected.
pub struct FlakyLedger<R: Record> {
    inner: MemoryLedger<R>,
    failures_left: AtomicU32,
    unavailable: AtomicBool,
    rejected: AtomicU32,
}

impl<R: Record> FlakyLedger<R> {
    pub fn new() -> Self {
        Self {
            inner: MemoryLedger::new(),
            failures_left: AtomicU32::new(0),
            unavailable: AtomicBool::new(false),
            rejected: AtomicU32::new(0),
        }
    }

    /// Reject the next `count` writes.
    pub fn fail_next_writes(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Writes rejected so far.
    pub fn rejected_count(&self) -> u32 {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<R> {
        self.inner.get(key)
    }

    fn check_write(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(LedgerError::Storage("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl<R: Record> Default for FlakyLedger<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> Ledger<R> for FlakyLedger<R> {
    fn observe(&self) -> SnapshotStream<R> {
        self.inner.observe()
    }

    async fn upsert(&self, record: R) -> Result<(), LedgerError> {
        self.check_write()?;
        self.inner.upsert(record).await
    }

    async fn remove(&self, record: &R) -> Result<(), LedgerError> {
        self.check_write()?;
        self.inner.remove(record).await
    }
}

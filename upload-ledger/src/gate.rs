//! Change detection between consecutive ledger snapshots.
//!
//! Ledgers may re-emit a snapshot after a write that did not alter anything a
//! pipeline cares about. The gate drops such emissions so unrelated writes do
//! not trigger redundant remote calls.

use std::collections::HashMap;

use futures::{future, StreamExt};
use serde::{Deserialize, Serialize};

use crate::ledger::{Record, SnapshotStream};

/// How two snapshots are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Cardinality, then per-key status.
    #[default]
    Full,
    /// Cardinality only.
    ///
    /// Misses a record whose status flips in place; only use where the call
    /// rate makes the full comparison too expensive.
    SizeOnly,
}

impl Comparison {
    /// Whether `current` differs from `previous` under this comparison.
    pub fn has_changed<R: Record>(&self, previous: &[R], current: &[R]) -> bool {
        if previous.len() != current.len() {
            return true;
        }
        match self {
            Self::SizeOnly => false,
            Self::Full => {
                let by_key: HashMap<&str, &R> = current.iter().map(|r| (r.key(), r)).collect();
                previous.iter().any(|before| match by_key.get(before.key()) {
                    Some(after) => before.status() != after.status(),
                    None => true,
                })
            }
        }
    }
}

/// Drop snapshots that did not change relative to the one before them.
///
/// The first snapshot always passes.
pub fn distinct<R: Record>(snapshots: SnapshotStream<R>, comparison: Comparison) -> SnapshotStream<R> {
    snapshots
        .scan(None::<Vec<R>>, move |previous, current| {
            let changed = previous
                .as_deref()
                .map_or(true, |before| comparison.has_changed(before, &current));
            *previous = Some(current.clone());
            future::ready(Some(changed.then_some(current)))
        })
        .filter_map(future::ready)
        .boxed()
}

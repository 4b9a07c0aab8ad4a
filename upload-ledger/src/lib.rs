//! Upload Ledger - observable record collections for the upload pipeline
//!
//! Two ledgers back the uploader:
//! - the **upload ledger**, one [`Upload`] per checksum currently in flight
//! - the **app-status ledger**, one [`AppUploadStatus`] per installed build
//!
//! Both are exposed through the [`Ledger`] trait: watchers subscribe to full
//! snapshots, writers upsert or remove by identity key. The [`gate`] module
//! filters snapshot streams down to the emissions that actually changed
//! something. [`FlakyLedger`] injects write failures for tests.

pub mod gate;
pub mod ledger;
pub mod mock;
pub mod model;

pub use gate::{distinct, Comparison};
pub use ledger::{
    AppStatusLedger, Ledger, LedgerError, MemoryLedger, Record, SnapshotStream, UploadLedger,
};
pub use mock::FlakyLedger;
pub use model::*;

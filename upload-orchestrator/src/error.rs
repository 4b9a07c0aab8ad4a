//! Error taxonomy for the orchestrator.

use upload_ledger::LedgerError;
use upload_services::{ChecksumError, ServiceError};

/// Errors surfaced by the orchestrator.
///
/// `submit_for_upload` returns these to its caller. Inside pipelines they are
/// logged against the record that produced them and the pipeline carries on.
#[derive(Debug, thiserror::Error)]
pub enum UploaderError {
    /// Local checksum computation failed
    #[error("Checksum error: {0}")]
    Checksum(#[from] ChecksumError),

    /// Remote call failed
    #[error("Remote error: {0}")]
    Remote(#[from] ServiceError),

    /// Ledger read or write failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Remote call exceeded its deadline
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UploaderError {
    /// Transient failures worth retrying on a later ledger emission.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Remote(ServiceError::Network(_) | ServiceError::Unavailable(_))
        )
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, UploaderError>;

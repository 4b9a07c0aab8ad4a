//! Core traits for the collaborators the orchestrator drives.
//!
//! None of these are implemented by the orchestrator itself: the remote store
//! transport, the checksum engine, the account subsystem, the OS background
//! scheduler and the app enumerator all live behind these seams.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use upload_ledger::{Account, AppUploadStatus, InstalledApp, Metadata, Upload};

/// Error types for remote and device service calls.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The remote understood the request and refused it
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Service is not reachable right now
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Malformed response
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Error types for checksum computation.
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    /// Reading the binary failed
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// No checksum can be produced for this app
    #[error("Checksum unavailable for {0}")]
    Unavailable(String),
}

/// Request establishing an upload's starting status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub checksum: String,
    pub language: String,
    pub store_name: String,
    pub app: InstalledApp,
}

/// Request sending a binary, optionally with listing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub checksum: String,
    pub store_name: String,
    /// Display name sent alongside the binary
    pub name: String,
    pub app: InstalledApp,
    pub metadata: Option<Metadata>,
}

impl SubmitRequest {
    /// Binary-only submission for `upload`, targeting `store_name`.
    pub fn binary(upload: &Upload, store_name: impl Into<String>) -> Self {
        Self {
            checksum: upload.checksum.clone(),
            store_name: store_name.into(),
            name: upload.installed_app.name.clone(),
            app: upload.installed_app.clone(),
            metadata: None,
        }
    }

    /// Attach listing metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The remote store's upload API.
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Obtain the starting status for a new upload.
    async fn claim(&self, request: ClaimRequest) -> Result<Upload, ServiceError>;

    /// Send the binary (and metadata when present); returns the updated upload.
    async fn submit(&self, request: SubmitRequest) -> Result<Upload, ServiceError>;

    /// Whether listing metadata already exists for this build.
    async fn has_metadata(&self, package_name: &str, version_code: u64) -> Result<bool, ServiceError>;

    /// Latest remote truth for a set of checksums, in one call.
    async fn status_of(&self, checksums: &[String]) -> Result<Vec<AppUploadStatus>, ServiceError>;

    /// Ask the remote to re-check a checksum. The outcome arrives through the
    /// service's own completion path, not as a return value.
    async fn retry_check(&self, checksum: &str) -> Result<(), ServiceError>;
}

/// Content checksum computation.
#[async_trait]
pub trait ChecksumService: Send + Sync {
    async fn compute(&self, app: &InstalledApp) -> Result<String, ChecksumError>;
}

/// Live account signal.
pub trait AccountProvider: Send + Sync {
    /// Current account first, then every change.
    fn observe(&self) -> BoxStream<'static, Account>;
}

/// OS-level background execution toggle. Both calls are idempotent.
#[async_trait]
pub trait BackgroundCapability: Send + Sync {
    async fn enable(&self);
    async fn disable(&self);
}

/// Enumerates apps installed on the device.
#[async_trait]
pub trait AppEnumerator: Send + Sync {
    async fn list_non_system_apps(&self) -> Result<Vec<InstalledApp>, ServiceError>;
}

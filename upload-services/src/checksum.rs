//! SHA-256 content checksums over an app's binary.

use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use upload_ledger::InstalledApp;

use crate::traits::{ChecksumError, ChecksumService};

/// Hashes the file at `InstalledApp::apk_path`.
///
/// Hashing runs on the blocking pool so large binaries never stall the
/// runtime's worker threads.
#[derive(Debug, Clone, Default)]
pub struct Sha256Checksum;

impl Sha256Checksum {
    pub fn new() -> Self {
        Self
    }

    /// Lowercase hex SHA-256 of the file at `path`.
    pub fn hash_file(path: &Path) -> Result<String, ChecksumError> {
        let io_err = |source| ChecksumError::Io {
            path: path.display().to_string(),
            source,
        };

        let mut file = std::fs::File::open(path).map_err(io_err)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher).map_err(io_err)?;

        Ok(hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl ChecksumService for Sha256Checksum {
    async fn compute(&self, app: &InstalledApp) -> Result<String, ChecksumError> {
        let path = app.apk_path.clone();
        let package = app.package_name.clone();

        let checksum = tokio::task::spawn_blocking(move || Self::hash_file(&path))
            .await
            .map_err(|e| ChecksumError::Unavailable(format!("{package}: {e}")))??;

        debug!(package = %app.package_name, %checksum, "Computed checksum");
        Ok(checksum)
    }
}

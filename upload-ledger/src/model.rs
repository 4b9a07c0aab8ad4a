//! Records held by the upload and app-status ledgers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// An application installed on the device.
///
/// Identity is package name + version code; the orchestrator only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    /// Package name (e.g. `com.example.app`)
    pub package_name: String,
    /// Version code of the installed build
    pub version_code: u64,
    /// Human readable name
    pub name: String,
    /// Path of the binary the checksum is computed from
    pub apk_path: PathBuf,
}

impl InstalledApp {
    /// Create a new installed app.
    pub fn new(
        package_name: impl Into<String>,
        version_code: u64,
        name: impl Into<String>,
        apk_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            version_code,
            name: name.into(),
            apk_path: apk_path.into(),
        }
    }

    /// Whether this is the build identified by `package_name` + `version_code`.
    pub fn same_build(&self, package_name: &str, version_code: u64) -> bool {
        self.package_name == package_name && self.version_code == version_code
    }
}

/// Store listing metadata attached to an upload once the remote asks for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Listing title
    pub name: String,
    /// Listing language
    pub language: String,
    /// Listing description
    #[serde(default)]
    pub description: Option<String>,
    /// Store category
    #[serde(default)]
    pub category: Option<String>,
}

impl Metadata {
    /// Create metadata with the required fields.
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            description: None,
            category: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Where an upload currently sits in its remote lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "metadata", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    /// Claimed, binary not yet sent
    Pending,
    /// Remote has never seen this checksum
    NotExistent,
    /// Remote has the binary but no listing metadata
    NoMetadata,
    /// Metadata is ready to be submitted
    MetadataAdded(Metadata),
    /// Remote asked for a status re-check
    Retry,
    /// Remote accepted the upload
    Completed,
}

impl UploadStatus {
    /// The payload-free discriminant.
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Pending => StatusKind::Pending,
            Self::NotExistent => StatusKind::NotExistent,
            Self::NoMetadata => StatusKind::NoMetadata,
            Self::MetadataAdded(_) => StatusKind::MetadataAdded,
            Self::Retry => StatusKind::Retry,
            Self::Completed => StatusKind::Completed,
        }
    }

    /// Metadata payload, if any.
    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            Self::MetadataAdded(metadata) => Some(metadata),
            _ => None,
        }
    }
}

/// Status without its payload; what pipelines filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Pending,
    NotExistent,
    NoMetadata,
    MetadataAdded,
    Retry,
    Completed,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::NotExistent => "NOT_EXISTENT",
            Self::NoMetadata => "NO_METADATA",
            Self::MetadataAdded => "METADATA_ADDED",
            Self::Retry => "RETRY",
            Self::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// One in-flight transfer of an installed app to a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    /// Content checksum; the ledger key
    pub checksum: String,
    /// Destination store
    pub store_name: String,
    /// App being uploaded
    pub installed_app: InstalledApp,
    /// Lifecycle position
    pub status: UploadStatus,
}

impl Upload {
    /// Create an upload in the given status.
    pub fn new(
        checksum: impl Into<String>,
        store_name: impl Into<String>,
        installed_app: InstalledApp,
        status: UploadStatus,
    ) -> Self {
        Self {
            checksum: checksum.into(),
            store_name: store_name.into(),
            installed_app,
            status,
        }
    }

    /// Same upload moved to `status`.
    pub fn with_status(mut self, status: UploadStatus) -> Self {
        self.status = status;
        self
    }

    /// Shorthand for `self.status.kind()`.
    pub fn kind(&self) -> StatusKind {
        self.status.kind()
    }
}

/// Durable record of whether an installed build was ever fully uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUploadStatus {
    pub checksum: String,
    pub package_name: String,
    pub uploaded: bool,
    pub version_code: u64,
}

impl AppUploadStatus {
    /// Create a status record.
    pub fn new(
        checksum: impl Into<String>,
        package_name: impl Into<String>,
        uploaded: bool,
        version_code: u64,
    ) -> Self {
        Self {
            checksum: checksum.into(),
            package_name: package_name.into(),
            uploaded,
            version_code,
        }
    }

    /// Not-yet-uploaded record for a freshly enumerated app.
    pub fn pending(checksum: impl Into<String>, app: &InstalledApp) -> Self {
        Self::new(checksum, app.package_name.clone(), false, app.version_code)
    }

    /// Uploaded record mirroring a completed upload.
    pub fn completed(upload: &Upload) -> Self {
        Self::new(
            upload.checksum.clone(),
            upload.installed_app.package_name.clone(),
            true,
            upload.installed_app.version_code,
        )
    }
}

/// The signed-in state reported by the account subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Account {
    /// Nobody is signed in
    #[default]
    Anonymous,
    /// A session exists for the given store
    Authenticated { store_name: String },
}

impl Account {
    /// Authenticated account for `store_name`.
    pub fn authenticated(store_name: impl Into<String>) -> Self {
        Self::Authenticated {
            store_name: store_name.into(),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn store_name(&self) -> Option<&str> {
        match self {
            Self::Authenticated { store_name } => Some(store_name),
            Self::Anonymous => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> InstalledApp {
        InstalledApp::new("com.example.app", 42, "Example", "/data/app/example.apk")
    }

    #[test]
    fn test_status_kind_drops_payload() {
        let status = UploadStatus::MetadataAdded(Metadata::new("Example", "en"));
        assert_eq!(status.kind(), StatusKind::MetadataAdded);
        assert_eq!(status.metadata().map(|m| m.name.as_str()), Some("Example"));
        assert!(UploadStatus::Pending.metadata().is_none());
    }

    #[test]
    fn test_status_serializes_as_tag() {
        let upload = Upload::new("m1", "store", app(), UploadStatus::NotExistent);
        let json = serde_json::to_value(&upload).unwrap();
        assert_eq!(json["status"]["kind"], "NOT_EXISTENT");
        assert!(json["status"].get("metadata").is_none());

        let with_metadata = upload.with_status(UploadStatus::MetadataAdded(
            Metadata::new("Example", "en").with_category("tools"),
        ));
        let json = serde_json::to_value(&with_metadata).unwrap();
        assert_eq!(json["status"]["kind"], "METADATA_ADDED");
        assert_eq!(json["status"]["metadata"]["category"], "tools");

        let back: Upload = serde_json::from_value(json).unwrap();
        assert_eq!(back, with_metadata);
    }

    #[test]
    fn test_completed_mirror() {
        let upload = Upload::new("m1", "store", app(), UploadStatus::Completed);
        let status = AppUploadStatus::completed(&upload);
        assert_eq!(status, AppUploadStatus::new("m1", "com.example.app", true, 42));
    }

    #[test]
    fn test_account_accessors() {
        assert!(!Account::Anonymous.is_logged_in());
        assert_eq!(Account::default(), Account::Anonymous);
        let account = Account::authenticated("my-store");
        assert!(account.is_logged_in());
        assert_eq!(account.store_name(), Some("my-store"));
    }
}

//! Device-side mocks: checksums, installed apps, background toggle, account.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use upload_ledger::{Account, InstalledApp};

use crate::traits::{
    AccountProvider, AppEnumerator, BackgroundCapability, ChecksumError, ChecksumService,
    ServiceError,
};

/// Checksums looked up by package name instead of hashing a file.
#[derive(Default)]
pub struct StaticChecksum {
    checksums: DashMap<String, String>,
    calls: AtomicU32,
}

impl StaticChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checksum reported for `package_name`.
    pub fn with(self, package_name: impl Into<String>, checksum: impl Into<String>) -> Self {
        self.checksums.insert(package_name.into(), checksum.into());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChecksumService for StaticChecksum {
    async fn compute(&self, app: &InstalledApp) -> Result<String, ChecksumError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.checksums
            .get(&app.package_name)
            .map(|c| c.value().clone())
            .ok_or_else(|| ChecksumError::Unavailable(app.package_name.clone()))
    }
}

/// Fixed list of installed apps.
#[derive(Default)]
pub struct StaticApps {
    apps: Vec<InstalledApp>,
    unavailable: AtomicBool,
}

impl StaticApps {
    pub fn new(apps: impl IntoIterator<Item = InstalledApp>) -> Self {
        Self {
            apps: apps.into_iter().collect(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make enumeration fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl AppEnumerator for StaticApps {
    async fn list_non_system_apps(&self) -> Result<Vec<InstalledApp>, ServiceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("package manager".to_string()));
        }
        Ok(self.apps.clone())
    }
}

/// Background toggle that records what it was told.
#[derive(Default)]
pub struct RecordingBackground {
    enabled: AtomicBool,
    enable_calls: AtomicU32,
    disable_calls: AtomicU32,
}

impl RecordingBackground {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn enable_count(&self) -> u32 {
        self.enable_calls.load(Ordering::SeqCst)
    }

    pub fn disable_count(&self) -> u32 {
        self.disable_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundCapability for RecordingBackground {
    async fn enable(&self) {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        self.enabled.store(true, Ordering::SeqCst);
    }

    async fn disable(&self) {
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
    }
}

/// Account signal driven by the test.
pub struct MockAccount {
    current: watch::Sender<Account>,
}

impl MockAccount {
    /// Start signed out.
    pub fn new() -> Self {
        Self::with_account(Account::Anonymous)
    }

    pub fn with_account(account: Account) -> Self {
        let (current, _) = watch::channel(account);
        Self { current }
    }

    pub fn sign_in(&self, store_name: impl Into<String>) {
        self.current.send_replace(Account::authenticated(store_name));
    }

    pub fn sign_out(&self) {
        self.current.send_replace(Account::Anonymous);
    }
}

impl Default for MockAccount {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountProvider for MockAccount {
    fn observe(&self) -> BoxStream<'static, Account> {
        WatchStream::new(self.current.subscribe()).boxed()
    }
}

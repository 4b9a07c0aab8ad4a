//! Upload Services - the collaborators the upload orchestrator drives
//!
//! The orchestrator owns no transport, storage engine or OS integration. It
//! reaches all of them through the traits here:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │             UploadOrchestrator               │
//! └──┬──────────┬──────────┬──────────┬───────┬──┘
//!    ▼          ▼          ▼          ▼       ▼
//! Upload    Checksum    Account  Background  App
//! Service   Service     Provider Capability  Enumerator
//! ```
//!
//! [`Sha256Checksum`] is the production checksum engine; everything under
//! [`mock`] is an in-process stand-in.

pub mod checksum;
pub mod mock;
pub mod traits;

pub use checksum::Sha256Checksum;
pub use traits::{
    AccountProvider, AppEnumerator, BackgroundCapability, ChecksumError, ChecksumService,
    ClaimRequest, ServiceError, SubmitRequest, UploadService,
};

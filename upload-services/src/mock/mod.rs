//! In-process collaborators for tests and local runs.
//!
//! - [`MockUploadService`] - scriptable remote store
//! - [`StaticChecksum`], [`StaticApps`] - fixed device state
//! - [`RecordingBackground`] - records background toggles
//! - [`MockAccount`] - account signal driven by the caller

mod device;
mod remote;

pub use device::{MockAccount, RecordingBackground, StaticApps, StaticChecksum};
pub use remote::MockUploadService;

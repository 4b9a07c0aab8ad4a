//! Upload Orchestrator - reactive pipelines for app uploads
//!
//! Moves every claimed upload through its remote lifecycle:
//!
//! ```text
//! submit_for_upload ─▶ claim ─▶ upload ledger
//!                                   │
//!        PENDING ─▶ dispatch (account-gated) ─┐
//!        NOT_EXISTENT ─▶ NO_METADATA | submit ├─▶ remote returns next status
//!        METADATA_ADDED ─▶ submit metadata ───┘
//!        RETRY ─▶ remote re-check
//!        COMPLETED ─▶ app-status ledger (uploaded) + removal
//! ```
//!
//! Alongside those, the orchestrator seeds the app-status ledger once at
//! start, keeps it reconciled against the remote while an account is signed
//! in, and turns background execution on while completed uploads remain.
//!
//! ## Usage
//!
//! ```ignore
//! let orchestrator = UploadOrchestrator::new(collaborators);
//! orchestrator.start().await;
//! orchestrator.submit_for_upload("my-store", "en", app).await?;
//! orchestrator.stop().await;
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
mod seed;
pub mod status;

pub use config::OrchestratorConfig;
pub use error::{Result, UploaderError};
pub use orchestrator::{Collaborators, UploadOrchestrator};
pub use pipeline::names;
pub use status::{OrchestratorStatus, PipelineReport};

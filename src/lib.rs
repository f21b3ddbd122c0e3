#![warn(missing_docs)]
//! ClipWeave - multi-image AI video generation.
//!
//! This crate drives one video generation attempt end to end against a
//! remote generation service: it validates images and prompts, resolves
//! per-provider credentials, uploads the image batch, submits the
//! generation request and polls until the video is ready.
//!
//! # Quick Start
//!
//! ```no_run
//! use clipweave::{
//!     HttpGenerationService, ImageAsset, RawCredentials, Workflow, WorkflowConfig, WorkflowState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> clipweave::Result<()> {
//!     let service = HttpGenerationService::builder()
//!         .base_url("http://localhost:8000")
//!         .build()?;
//!     let mut workflow = Workflow::new(service, WorkflowConfig::new())?;
//!     workflow.load_providers().await?;
//!     workflow.select_provider("kling");
//!
//!     workflow.set_images(vec![
//!         ImageAsset::from_path("first.png").await?,
//!         ImageAsset::from_path("second.png").await?,
//!     ])?;
//!     workflow.set_prompts(vec!["slow zoom in".into(), "pan to the left".into()])?;
//!
//!     let credentials = RawCredentials::new()
//!         .with_access_key_id("...")
//!         .with_access_key_secret("...");
//!
//!     if let WorkflowState::Succeeded(_) = workflow.run(&credentials).await {
//!         workflow.fetch_video().await?.save("output.mp4").await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Providers
//!
//! - `kling`: Kling, access key id + access key secret
//! - `minmax`: MiniMax, API key + group id
//!
//! # Features
//!
//! - `cli`: Command-line interface (`clipweave` binary, on by default)

pub mod config;
pub mod credentials;
mod error;
pub mod poller;
pub mod provider;
pub mod service;
pub mod types;
pub mod validate;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export error types at crate root
pub use error::{
    detail_message, sanitize_error_message, ClipWeaveError, ErrorKind, Result, ValidationError,
    GENERIC_GENERATION_MESSAGE, GENERIC_UPLOAD_MESSAGE,
};

pub use config::{preset_credentials_from_env, PollConfig, WorkflowConfig};
pub use credentials::{CredentialBundle, RawCredentials, WireCredentials};
pub use poller::{PollOutcome, Poller};
pub use provider::{CredentialField, ProviderDescriptor, ProviderFamily, ProviderKind};
pub use service::{
    GenerationRequest, GenerationService, HttpGenerationService, HttpGenerationServiceBuilder,
    ProbeOutcome,
};
pub use types::{
    GeneratedVideo, GenerationJob, ImageAsset, ImageFormat, JobStatus, VideoHandle, WorkflowState,
};
pub use validate::{validate_input, MAX_IMAGES, MIN_IMAGES};
pub use workflow::{CancelHandle, Workflow};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::WorkflowConfig;
    pub use crate::credentials::RawCredentials;
    pub use crate::error::{ClipWeaveError, Result};
    pub use crate::service::{GenerationService, HttpGenerationService};
    pub use crate::types::{GeneratedVideo, ImageAsset, WorkflowState};
    pub use crate::workflow::{CancelHandle, Workflow};
}

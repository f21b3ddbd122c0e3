//! Remote generation service: trait seam and HTTP implementation.

mod http;

pub use http::{HttpGenerationService, HttpGenerationServiceBuilder};

use crate::credentials::{CredentialBundle, WireCredentials};
use crate::error::Result;
use crate::provider::{ProviderDescriptor, ProviderKind};
use crate::types::{GeneratedVideo, ImageAsset, VideoHandle};
use async_trait::async_trait;
use serde::Serialize;

/// Result of a single status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The video resource exists.
    Ready,
    /// Not available yet; probe again later.
    Pending,
    /// Any other status; polling must stop.
    Unexpected(u16),
}

impl ProbeOutcome {
    /// Classifies a probe response status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            200 => Self::Ready,
            404 => Self::Pending,
            other => Self::Unexpected(other),
        }
    }
}

/// Body of a generation request.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// One prompt per uploaded image, in upload order.
    pub prompts: Vec<String>,
    /// Provider wire id.
    pub provider: String,
    /// Primary credential.
    pub api_key: String,
    /// Access key secret, access-key providers only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_secret: Option<String>,
    /// Group id, API-key providers only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl GenerationRequest {
    /// Builds the request for `provider` from prompts and resolved credentials.
    pub fn new(prompts: Vec<String>, provider: ProviderKind, credentials: &CredentialBundle) -> Self {
        let WireCredentials {
            api_key,
            access_key_secret,
            group_id,
        } = credentials.wire_fields();
        Self {
            prompts,
            provider: provider.id().to_string(),
            api_key,
            access_key_secret,
            group_id,
        }
    }
}

impl std::fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("prompts", &self.prompts)
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("access_key_secret", &self.access_key_secret.as_ref().map(|_| "<redacted>"))
            .field("group_id", &self.group_id)
            .finish()
    }
}

/// Operations consumed from the remote generation service.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Lists the providers the service has configured.
    async fn list_providers(&self) -> Result<Vec<ProviderDescriptor>>;

    /// Uploads all images as one batch.
    async fn upload_images(&self, images: &[ImageAsset]) -> Result<()>;

    /// Starts generation and returns the job's video id.
    async fn start_generation(&self, request: &GenerationRequest) -> Result<String>;

    /// Checks whether the job's video is available.
    async fn probe(&self, video_id: &str) -> Result<ProbeOutcome>;

    /// Downloads a finished video.
    async fn download(&self, handle: &VideoHandle) -> Result<GeneratedVideo>;
}

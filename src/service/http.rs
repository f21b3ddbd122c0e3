//! HTTP client for the generation service.

use crate::error::{
    detail_message, ClipWeaveError, Result, GENERIC_GENERATION_MESSAGE, GENERIC_UPLOAD_MESSAGE,
};
use crate::provider::{ProviderDescriptor, ProviderList};
use crate::service::{GenerationRequest, GenerationService, ProbeOutcome};
use crate::types::{GeneratedVideo, ImageAsset, VideoHandle};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const BASE_URL_ENV: &str = "CLIPWEAVE_BASE_URL";

/// Builder for `HttpGenerationService`.
#[derive(Debug, Clone)]
pub struct HttpGenerationServiceBuilder {
    base_url: Option<String>,
    timeout: Duration,
}

impl Default for HttpGenerationServiceBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl HttpGenerationServiceBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service base URL. Falls back to `CLIPWEAVE_BASE_URL`, then
    /// `http://localhost:8000`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the service.
    pub fn build(self) -> Result<HttpGenerationService> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClipWeaveError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got {base_url:?}"
            )));
        }

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        Ok(HttpGenerationService { client, base_url })
    }
}

/// Generation service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGenerationService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGenerationService {
    /// Creates a new `HttpGenerationServiceBuilder`.
    pub fn builder() -> HttpGenerationServiceBuilder {
        HttpGenerationServiceBuilder::new()
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of a video resource.
    pub fn video_url(&self, handle: &VideoHandle) -> String {
        self.url(&handle.path())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn upload_form(images: &[ImageAsset]) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for image in images {
            let part = reqwest::multipart::Part::bytes(image.data.clone())
                .file_name(image.filename.clone())
                .mime_str(image.mime_type())
                .map_err(|e| ClipWeaveError::InvalidConfig(e.to_string()))?;
            form = form.part("files", part);
        }
        Ok(form)
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn list_providers(&self) -> Result<Vec<ProviderDescriptor>> {
        let response = self.client.get(self.url("/api-providers")).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClipWeaveError::UnexpectedResponse(format!(
                "provider listing failed: {} - {}",
                status.as_u16(),
                detail_message(&text, "Failed to fetch available API providers.")
            )));
        }

        let list: ProviderList = response.json().await?;
        tracing::debug!(count = list.providers.len(), "fetched API providers");
        Ok(list.providers)
    }

    async fn upload_images(&self, images: &[ImageAsset]) -> Result<()> {
        let form = Self::upload_form(images)?;
        let total_bytes: usize = images.iter().map(|i| i.size()).sum();

        let response = self
            .client
            .post(self.url("/upload-images"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClipWeaveError::Upload {
                status: status.as_u16(),
                message: detail_message(&text, GENERIC_UPLOAD_MESSAGE),
            });
        }

        tracing::debug!(count = images.len(), total_bytes, "uploaded image batch");
        Ok(())
    }

    async fn start_generation(&self, request: &GenerationRequest) -> Result<String> {
        let response = self
            .client
            .post(self.url("/generate-video"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClipWeaveError::Submission {
                status: status.as_u16(),
                message: detail_message(&text, GENERIC_GENERATION_MESSAGE),
            });
        }

        let submit_response: SubmitResponse = response.json().await?;
        submit_response
            .video_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ClipWeaveError::UnexpectedResponse("No video_id in response".into()))
    }

    async fn probe(&self, video_id: &str) -> Result<ProbeOutcome> {
        let url = self.video_url(&VideoHandle::new(video_id));
        let response = self.client.head(&url).send().await?;
        Ok(ProbeOutcome::from_status(response.status().as_u16()))
    }

    async fn download(&self, handle: &VideoHandle) -> Result<GeneratedVideo> {
        let response = self.client.get(self.video_url(handle)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClipWeaveError::Api {
                status: status.as_u16(),
                message: "Failed to download video".into(),
            });
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("video/mp4")
            .to_string();
        let data = response.bytes().await?.to_vec();

        Ok(GeneratedVideo::new(data, mime_type, handle.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    video_id: Option<String>,
}

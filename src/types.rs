//! Core types for a generation attempt.

use crate::error::{ErrorKind, Result};
use crate::provider::ProviderKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Image formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG.
    Png,
    /// JPEG.
    Jpeg,
    /// GIF.
    Gif,
    /// WebP.
    WebP,
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }
        None
    }
}

/// One user-selected image.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// Raw file contents.
    pub data: Vec<u8>,
    /// Original file name, sent as the multipart file name.
    pub filename: String,
}

impl ImageAsset {
    /// Creates an asset from in-memory bytes.
    pub fn new(data: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            data,
            filename: filename.into(),
        }
    }

    /// Reads an asset from disk, keeping the file name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self { data, filename })
    }

    /// Detected format: magic bytes first, then the file extension.
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_magic_bytes(&self.data).or_else(|| {
            Path::new(&self.filename)
                .extension()
                .and_then(|e| e.to_str())
                .and_then(ImageFormat::from_extension)
        })
    }

    /// MIME type for the upload part.
    pub fn mime_type(&self) -> &'static str {
        self.format()
            .map(|f| f.mime_type())
            .unwrap_or("application/octet-stream")
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAsset")
            .field("filename", &self.filename)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Status of a submitted generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Submitted, video not available yet.
    Pending,
    /// Video available.
    Ready,
    /// Polling stopped without a video.
    Failed,
}

impl JobStatus {
    /// Ready and Failed are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// A submitted generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Opaque video id returned by the service.
    pub id: String,
    /// Provider the job was submitted to.
    pub provider: ProviderKind,
    /// When the service accepted the job.
    pub submitted_at: DateTime<Utc>,
    status: JobStatus,
}

impl GenerationJob {
    /// Creates a pending job.
    pub fn new(id: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            id: id.into(),
            provider,
            submitted_at: Utc::now(),
            status: JobStatus::Pending,
        }
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Handle for the job's output resource.
    pub fn handle(&self) -> VideoHandle {
        VideoHandle::new(&self.id)
    }

    /// Moves the job to `status`. Terminal states never change; returns
    /// whether the transition happened.
    pub(crate) fn transition(&mut self, status: JobStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}

/// Reference to a retrievable video resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoHandle {
    /// Opaque id returned by the service.
    pub video_id: String,
}

impl VideoHandle {
    /// Creates a handle for `video_id`.
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
        }
    }

    /// Service-relative path of the video resource.
    pub fn path(&self) -> String {
        format!("/video/{}", self.video_id)
    }
}

impl std::fmt::Display for VideoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// A downloaded video with its data.
#[derive(Debug, Clone)]
pub struct GeneratedVideo {
    /// Raw video bytes.
    pub data: Vec<u8>,
    /// MIME type (e.g., "video/mp4").
    pub mime_type: String,
    /// Resource the video was fetched from.
    pub handle: VideoHandle,
}

impl GeneratedVideo {
    /// Creates a new generated video.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, handle: VideoHandle) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            handle,
        }
    }

    /// Returns the size of the video data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Saves the video to the specified path.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path, &self.data).await?;
        Ok(())
    }
}

/// Observable state of the workflow controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    /// No attempt running.
    Idle,
    /// Checking inputs and credentials.
    Validating,
    /// Sending the image batch.
    Uploading,
    /// Sending the generation request.
    Submitting,
    /// Waiting for the submitted job.
    Polling(GenerationJob),
    /// The video is available.
    Succeeded(VideoHandle),
    /// The attempt stopped at `kind` with a user-facing message.
    Failed {
        /// Stage that failed.
        kind: ErrorKind,
        /// User-facing message.
        message: String,
    },
}

impl WorkflowState {
    /// Short label for logs and status lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Uploading => "uploading",
            Self::Submitting => "submitting",
            Self::Polling(_) => "polling",
            Self::Succeeded(_) => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    /// Succeeded and Failed end an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed { .. })
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Polling(job) => write!(f, "polling ({})", job.id),
            Self::Succeeded(handle) => write!(f, "succeeded ({handle})"),
            Self::Failed { kind, message } => write!(f, "failed ({kind}): {message}"),
            other => write!(f, "{}", other.label()),
        }
    }
}

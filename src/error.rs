//! Error types for the generation workflow.

use crate::provider::CredentialField;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Generic message for a rejected upload batch.
pub const GENERIC_UPLOAD_MESSAGE: &str = "Failed to upload images.";

/// Generic message for a failed submission or poll.
pub const GENERIC_GENERATION_MESSAGE: &str = "An error occurred while generating the video.";

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Input rejected before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Image count outside the accepted range.
    #[error("please upload between 1 and 6 images (got {count})")]
    ImageCountOutOfRange {
        /// Number of images supplied.
        count: usize,
    },

    /// Prompt and image sequences have different lengths.
    #[error("number of prompts ({prompts}) does not match number of images ({images})")]
    PromptCountMismatch {
        /// Number of images.
        images: usize,
        /// Number of prompts.
        prompts: usize,
    },

    /// A prompt is empty after trimming.
    #[error("please provide a prompt for image {}", .index + 1)]
    EmptyPrompt {
        /// Zero-based image index.
        index: usize,
    },

    /// No provider selected, or the selection is not offered by the service.
    #[error("please select an API provider")]
    NoProviderSelected,

    /// Provider id does not map to a known provider kind.
    #[error("unknown API provider: {0}")]
    UnknownProvider(String),

    /// Required credential fields are empty.
    #[error("missing credentials for {provider}: {}", join_fields(.fields))]
    MissingCredentials {
        /// Provider id.
        provider: String,
        /// Empty fields, in declaration order.
        fields: Vec<CredentialField>,
    },
}

fn join_fields(fields: &[CredentialField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur while generating a video.
#[derive(Debug, thiserror::Error)]
pub enum ClipWeaveError {
    /// Local pre-flight validation failed.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The upload batch was rejected.
    #[error("upload failed: {status} - {message}")]
    Upload {
        /// HTTP status code.
        status: u16,
        /// Server detail or the generic upload message.
        message: String,
    },

    /// The generation request was rejected.
    #[error("submission failed: {status} - {message}")]
    Submission {
        /// HTTP status code.
        status: u16,
        /// Server detail or the generic generation message.
        message: String,
    },

    /// Polling stopped on a definitive non-success signal.
    #[error("polling failed: {message}")]
    Poll {
        /// HTTP status code, absent for transport failures.
        status: Option<u16>,
        /// User-facing message.
        message: String,
    },

    /// Any other non-success response (e.g., video download).
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// What failed.
        message: String,
    },

    /// Polling gave up (probe ceiling or overall timeout).
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Response did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Operation not allowed in the current workflow state.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration value could not be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (e.g., reading an image or saving a video).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClipWeaveError {
    /// Returns true if retrying the whole attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Human-readable message: server detail when present, else `generic`.
    pub fn user_message(&self, generic: &str) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Upload { message, .. }
            | Self::Submission { message, .. }
            | Self::Poll { message, .. } => message.clone(),
            _ => generic.to_string(),
        }
    }
}

/// Stage at which a workflow attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Input or credential checks.
    Validation,
    /// Image upload.
    Upload,
    /// Generation request.
    Submission,
    /// Status polling.
    Poll,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Upload => write!(f, "upload"),
            Self::Submission => write!(f, "submission"),
            Self::Poll => write!(f, "poll"),
        }
    }
}

/// Strips control characters and caps the length of server-supplied text.
pub fn sanitize_error_message(text: &str) -> String {
    let cleaned: String = text.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = cleaned.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct DetailBody {
    detail: Detail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Detail {
    Text(String),
    Items(Vec<DetailItem>),
}

#[derive(Debug, Deserialize)]
struct DetailItem {
    msg: String,
}

/// Picks the best human-readable message out of an error response body.
///
/// Prefers a JSON `detail` field (either a string or a list of `{msg}`
/// objects), then short plain-text bodies, and falls back to `generic`.
pub fn detail_message(body: &str, generic: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<DetailBody>(body) {
        let text = match parsed.detail {
            Detail::Text(text) => text,
            Detail::Items(items) => items
                .into_iter()
                .map(|i| i.msg)
                .collect::<Vec<_>>()
                .join("; "),
        };
        let text = sanitize_error_message(&text);
        if !text.is_empty() {
            return text;
        }
        return generic.to_string();
    }

    let trimmed = body.trim();
    let looks_structured = trimmed.starts_with('{')
        || trimmed.starts_with('[')
        || trimmed.starts_with('<');
    if trimmed.is_empty() || looks_structured {
        return generic.to_string();
    }
    sanitize_error_message(trimmed)
}

/// Result type alias for workflow operations.
pub type Result<T> = std::result::Result<T, ClipWeaveError>;

//! Pre-flight input checks. Nothing here performs I/O.

use crate::error::ValidationError;
use crate::provider::ProviderDescriptor;
use crate::types::ImageAsset;

/// Minimum number of images per attempt.
pub const MIN_IMAGES: usize = 1;
/// Maximum number of images per attempt.
pub const MAX_IMAGES: usize = 6;

/// Validates images, prompts and provider selection.
///
/// Checks run in a fixed order and the first violation is returned.
pub fn validate_input(
    images: &[ImageAsset],
    prompts: &[String],
    provider_id: &str,
    known_providers: &[ProviderDescriptor],
) -> Result<(), ValidationError> {
    check_image_count(images.len())?;

    if prompts.len() != images.len() {
        return Err(ValidationError::PromptCountMismatch {
            images: images.len(),
            prompts: prompts.len(),
        });
    }

    if let Some(index) = prompts.iter().position(|p| p.trim().is_empty()) {
        return Err(ValidationError::EmptyPrompt { index });
    }

    let provider_id = provider_id.trim();
    if provider_id.is_empty() || !known_providers.iter().any(|p| p.id == provider_id) {
        return Err(ValidationError::NoProviderSelected);
    }

    Ok(())
}

/// Checks that `count` is within `MIN_IMAGES..=MAX_IMAGES`.
pub fn check_image_count(count: usize) -> Result<(), ValidationError> {
    if (MIN_IMAGES..=MAX_IMAGES).contains(&count) {
        Ok(())
    } else {
        Err(ValidationError::ImageCountOutOfRange { count })
    }
}

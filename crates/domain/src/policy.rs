//! Content and target constraints for scheduled posts

use crate::model::Platform;

/// Maximum content length, counted in Unicode code points
pub const MAX_CONTENT_CODE_POINTS: usize = 500;

/// Policy violation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Content exceeds {max} code points: {len}")]
    ContentTooLong { len: usize, max: usize },
    #[error("Content must not be empty")]
    EmptyContent,
    #[error("At least one target platform is required")]
    NoTargets,
    #[error("Duplicate target platform: {0}")]
    DuplicateTarget(Platform),
}

/// Validate post content against the length bound
pub fn validate_content(content: &str) -> Result<(), PolicyError> {
    if content.trim().is_empty() {
        return Err(PolicyError::EmptyContent);
    }
    let len = content.chars().count();
    if len > MAX_CONTENT_CODE_POINTS {
        return Err(PolicyError::ContentTooLong {
            len,
            max: MAX_CONTENT_CODE_POINTS,
        });
    }
    Ok(())
}

/// Validate the target set: non-empty, no duplicates
pub fn validate_targets(targets: &[Platform]) -> Result<(), PolicyError> {
    if targets.is_empty() {
        return Err(PolicyError::NoTargets);
    }
    for (i, target) in targets.iter().enumerate() {
        if targets[..i].contains(target) {
            return Err(PolicyError::DuplicateTarget(*target));
        }
    }
    Ok(())
}

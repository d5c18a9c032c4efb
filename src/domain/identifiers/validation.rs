use crate::domain::error::PromptError;

/// Validates a template id before it is used in a path or cache key.
///
/// Rejects:
/// - Empty ids
/// - Path separators (/, \)
/// - Parent references ("..")
/// - Colons (drive letters, URL schemes)
pub fn validate_id(id: &str) -> Result<(), PromptError> {
    let reason = if id.is_empty() {
        "id is empty"
    } else if id.contains('/') || id.contains('\\') {
        "id contains a path separator"
    } else if id.contains("..") {
        "id contains '..'"
    } else if id.contains(':') {
        "id contains ':'"
    } else {
        return Ok(());
    };
    Err(PromptError::InvalidName(format!("{:?}: {}", id, reason)))
}

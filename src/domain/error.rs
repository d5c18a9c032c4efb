use std::io;

use thiserror::Error;

use super::message::Role;

/// Library-wide error type for prompty operations.
///
/// Every variant is a distinct kind so callers can branch with `matches!`
/// instead of inspecting messages.
#[derive(Debug, Error)]
pub enum PromptError {
    /// A message body failed to parse. No template is produced.
    #[error("template parsing failed: message {index}: {source}")]
    TemplateParse {
        index: usize,
        #[source]
        source: minijinja::Error,
    },

    /// A shared partial fragment failed to parse.
    #[error("template parsing failed: partial '{name}': {source}")]
    PartialParse {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// Executing a compiled message failed.
    #[error("template rendering failed: message {index} (role {role}): {source}")]
    TemplateRender {
        index: usize,
        role: Role,
        #[source]
        source: minijinja::Error,
    },

    /// Payload is absent or declares no usable prompt fields.
    #[error("payload is invalid or declares no prompt fields")]
    InvalidPayload,

    /// Payload tried to supply the reserved `Tools` variable.
    #[error("reserved variable name in payload: use a different name than 'Tools'")]
    ReservedVariable,

    /// A required variable is neither in the defaults nor in the payload.
    #[error("required template variable '{variable}' not provided (template '{template}')")]
    MissingVariable { variable: String, template: String },

    /// The caller's cancellation token fired before rendering finished.
    #[error("render cancelled")]
    Cancelled,

    /// Registry lookup found nothing for the id.
    #[error("template '{0}' not found in registry")]
    TemplateNotFound(String),

    /// Manifest document is malformed or incomplete.
    #[error("manifest is malformed: {0}")]
    InvalidManifest(String),

    /// Template id contains characters that are unsafe for paths or cache keys.
    #[error("invalid template name: {0}")]
    InvalidName(String),

    /// Configuration or environment issue.
    #[error("{0}")]
    Configuration(String),

    /// Encoding a rendered prompt or decoding caller data failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PromptError {
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        PromptError::Configuration(message.into())
    }

    pub fn invalid_manifest<S: Into<String>>(reason: S) -> Self {
        PromptError::InvalidManifest(reason.into())
    }
}

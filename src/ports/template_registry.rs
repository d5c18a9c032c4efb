use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{CompiledTemplate, PromptError};

/// What a registry knows about a template without compiling it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateInfo {
    pub id: String,
    /// Registry-assigned version, e.g. a file timestamp or build tag.
    pub version: String,
    /// `None` when the source has no modification time.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Port for looking up compiled templates by id.
///
/// Implementations validate ids, cache compiled templates, and hand out
/// shared read-only handles.
pub trait TemplateRegistry: Send + Sync {
    /// Fetch the compiled template for `id`.
    fn get_template(&self, id: &str) -> Result<Arc<CompiledTemplate>, PromptError>;

    /// All known template ids.
    fn list(&self) -> Result<Vec<String>, PromptError>;

    fn stat(&self, id: &str) -> Result<TemplateInfo, PromptError>;
}

use std::fmt;
use std::sync::Arc;

use minijinja::Value;
use serde::Serialize;

use crate::domain::message::{Metadata, PromptMetadata, SchemaDefinition, ToolDefinition};
use crate::domain::payload::{SchemaCache, Variables};
use crate::domain::token::{CharFallbackCounter, TokenCounter};

/// Compile-time options for a [`CompiledTemplate`](super::CompiledTemplate).
///
/// Everything is optional; the builder methods consume and return `self`.
#[derive(Clone)]
pub struct TemplateOptions {
    pub(crate) default_variables: Variables,
    pub(crate) tools: Vec<ToolDefinition>,
    pub(crate) model_config: Metadata,
    pub(crate) metadata: PromptMetadata,
    pub(crate) required_vars: Vec<String>,
    pub(crate) response_format: Option<SchemaDefinition>,
    pub(crate) token_counter: Arc<dyn TokenCounter>,
    pub(crate) partials: Vec<(String, String)>,
    pub(crate) schema_cache: Arc<SchemaCache>,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            default_variables: Variables::new(),
            tools: Vec::new(),
            model_config: Metadata::new(),
            metadata: PromptMetadata::default(),
            required_vars: Vec::new(),
            response_format: None,
            token_counter: Arc::new(CharFallbackCounter::default()),
            partials: Vec::new(),
            schema_cache: SchemaCache::shared(),
        }
    }
}

impl TemplateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values used when the payload does not supply a variable.
    pub fn with_default_variables(mut self, defaults: Variables) -> Self {
        self.default_variables.extend(defaults);
        self
    }

    pub fn with_default_variable(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        self.default_variables.insert(name.into(), Value::from_serialize(value));
        self
    }

    /// Tools exposed to every render as the `Tools` variable.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_model_config(mut self, model_config: Metadata) -> Self {
        self.model_config = model_config;
        self
    }

    pub fn with_metadata(mut self, metadata: PromptMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Variables that must be present at render time, checked in this order
    /// ahead of those derived from the messages.
    pub fn with_required_vars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_vars = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_response_format(mut self, format: SchemaDefinition) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_token_counter(self, counter: impl TokenCounter + 'static) -> Self {
        self.with_shared_token_counter(Arc::new(counter))
    }

    /// Same as [`with_token_counter`](Self::with_token_counter) for a counter
    /// shared between templates.
    pub fn with_shared_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.token_counter = counter;
        self
    }

    /// Register a shared fragment, usable as `{% include "name" %}`.
    pub fn with_partial(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.partials.push((name.into(), source.into()));
        self
    }

    /// Use a private schema cache instead of the process-wide one.
    pub fn with_schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.schema_cache = cache;
        self
    }

    pub fn metadata(&self) -> &PromptMetadata {
        &self.metadata
    }

    pub(crate) fn set_version(&mut self, version: impl Into<String>) {
        self.metadata.version = version.into();
    }
}

impl fmt::Debug for TemplateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateOptions")
            .field("default_variables", &self.default_variables)
            .field("tools", &self.tools)
            .field("metadata", &self.metadata)
            .field("required_vars", &self.required_vars)
            .field("partials", &self.partials.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_accumulate() {
        let options = TemplateOptions::new()
            .with_default_variable("tone", "friendly")
            .with_default_variable("limit", 3)
            .with_required_vars(["user"])
            .with_partial("footer", "Thanks!")
            .with_metadata(PromptMetadata { id: "greeting".to_string(), ..Default::default() });

        assert_eq!(options.default_variables.len(), 2);
        assert_eq!(options.required_vars, vec!["user".to_string()]);
        assert_eq!(options.partials.len(), 1);
        assert_eq!(options.metadata().id, "greeting");
        assert!(options.response_format.is_none());
    }

    #[test]
    fn default_uses_shared_schema_cache() {
        let options = TemplateOptions::default();
        assert!(Arc::ptr_eq(&options.schema_cache, &SchemaCache::shared()));
    }

    #[test]
    fn set_version_overrides_metadata() {
        let mut options = TemplateOptions::new();
        options.set_version("2024-01-01T00:00:00Z");
        assert_eq!(options.metadata().version, "2024-01-01T00:00:00Z");
    }
}

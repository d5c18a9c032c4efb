//! Compiled prompt templates.
//!
//! A [`CompiledTemplate`] is built once from a list of [`MessageTemplate`]s
//! and is immutable afterwards, so one instance can serve any number of
//! concurrent renders.

mod namespace;
mod options;
mod render;
mod variables;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use minijinja::Environment;
use tracing::debug;

pub use namespace::TemplateNamespace;
pub use options::TemplateOptions;
pub use render::is_zero;
pub use variables::dependent_variables;

use super::error::PromptError;
use super::message::{
    Metadata, MessageTemplate, PromptMetadata, Role, SchemaDefinition, ToolDefinition,
};
use super::payload::{SchemaCache, Variables};

/// One message after compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMessage {
    name: String,
    role: Role,
    optional: bool,
    dependent_variables: Vec<String>,
    metadata: Metadata,
}

impl CompiledMessage {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Top-level variables the body references, in first-seen order.
    pub fn dependent_variables(&self) -> &[String] {
        &self.dependent_variables
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// A prompt ready to render.
pub struct CompiledTemplate {
    env: Environment<'static>,
    sources: Vec<MessageTemplate>,
    messages: Vec<CompiledMessage>,
    default_variables: Variables,
    tools: Vec<ToolDefinition>,
    model_config: Metadata,
    metadata: PromptMetadata,
    explicit_required: Vec<String>,
    derived_required: Vec<String>,
    response_format: Option<SchemaDefinition>,
    schema_cache: Arc<SchemaCache>,
}

impl CompiledTemplate {
    /// Compile `messages` in a fresh namespace holding the helper functions
    /// and the partials from `options`.
    pub fn compile(
        messages: Vec<MessageTemplate>,
        options: TemplateOptions,
    ) -> Result<Self, PromptError> {
        let mut namespace = TemplateNamespace::new(Arc::clone(&options.token_counter));
        for (name, source) in &options.partials {
            namespace.add_partial(name.clone(), source.clone())?;
        }
        Self::compile_in(namespace, messages, options)
    }

    /// Compile `messages` into a caller-prepared namespace.
    ///
    /// Partials listed in `options` are registered on top of whatever the
    /// namespace already holds.
    pub fn compile_in(
        mut namespace: TemplateNamespace,
        messages: Vec<MessageTemplate>,
        options: TemplateOptions,
    ) -> Result<Self, PromptError> {
        let registered: HashSet<String> = namespace.partial_names().iter().cloned().collect();
        for (name, source) in &options.partials {
            if !registered.contains(name) {
                namespace.add_partial(name.clone(), source.clone())?;
            }
        }

        let mut env = namespace.into_environment();
        let globals: HashSet<String> = env.globals().map(|(name, _)| name.to_string()).collect();
        let mut compiled = Vec::with_capacity(messages.len());

        for (index, message) in messages.iter().enumerate() {
            let name = message_name(index);
            env.add_template_owned(name.clone(), message.content.clone())
                .map_err(|source| PromptError::TemplateParse { index, source })?;
            let dependencies = dependent_variables(&message.content, &globals)
                .map_err(|source| PromptError::TemplateParse { index, source })?;

            compiled.push(CompiledMessage {
                dependent_variables: dependencies,
                name,
                role: message.role,
                optional: message.optional,
                metadata: message.metadata.clone(),
            });
        }

        let derived_required = union_in_order(
            compiled.iter().filter(|m| !m.optional).flat_map(|m| m.dependent_variables.iter()),
        );

        debug!(
            template = %options.metadata.id,
            messages = compiled.len(),
            required = derived_required.len(),
            "compiled template"
        );

        Ok(Self {
            env,
            sources: messages,
            messages: compiled,
            default_variables: options.default_variables,
            tools: options.tools,
            model_config: options.model_config,
            metadata: options.metadata,
            explicit_required: options.required_vars,
            derived_required,
            response_format: options.response_format,
            schema_cache: options.schema_cache,
        })
    }

    /// Explicit names first, then names derived from non-optional messages.
    pub fn required_variables(&self) -> Vec<String> {
        union_in_order(self.explicit_required.iter().chain(self.derived_required.iter()))
    }

    /// The message templates this was compiled from.
    pub fn message_templates(&self) -> &[MessageTemplate] {
        &self.sources
    }

    pub fn compiled_messages(&self) -> &[CompiledMessage] {
        &self.messages
    }

    pub fn default_variables(&self) -> &Variables {
        &self.default_variables
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn model_config(&self) -> &Metadata {
        &self.model_config
    }

    pub fn metadata(&self) -> &PromptMetadata {
        &self.metadata
    }

    pub fn response_format(&self) -> Option<&SchemaDefinition> {
        self.response_format.as_ref()
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.schema_cache
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("metadata", &self.metadata)
            .field("messages", &self.messages)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

fn message_name(index: usize) -> String {
    format!("message#{}", index)
}

fn union_in_order<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.filter(|name| seen.insert(name.as_str())).cloned().collect()
}

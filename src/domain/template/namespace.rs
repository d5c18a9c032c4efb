use std::sync::Arc;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use tracing::debug;

use crate::domain::error::PromptError;
use crate::domain::functions::register_functions;
use crate::domain::token::TokenCounter;

/// Template environment shared by the messages of one prompt.
///
/// Holds the helper functions and any registered partials. Message bodies
/// are added when a [`CompiledTemplate`](super::CompiledTemplate) is built.
pub struct TemplateNamespace {
    env: Environment<'static>,
    partials: Vec<String>,
}

impl TemplateNamespace {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        // Prompts are plain text; nothing is HTML-escaped.
        env.set_auto_escape_callback(|_| AutoEscape::None);
        register_functions(&mut env, counter);
        Self { env, partials: Vec::new() }
    }

    /// Parse and register a partial under `name`.
    pub fn add_partial(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), PromptError> {
        let name = name.into();
        self.env
            .add_template_owned(name.clone(), source.into())
            .map_err(|source| PromptError::PartialParse { name: name.clone(), source })?;
        debug!(partial = %name, "registered partial");
        self.partials.push(name);
        Ok(())
    }

    pub fn partial_names(&self) -> &[String] {
        &self.partials
    }

    /// Escape hatch for registering extra functions or filters.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }

    pub(crate) fn into_environment(self) -> Environment<'static> {
        self.env
    }
}

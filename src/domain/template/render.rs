use minijinja::Value;
use minijinja::value::ValueKind;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{CompiledMessage, CompiledTemplate};
use crate::domain::error::PromptError;
use crate::domain::message::{ChatMessage, ContentPart, PromptExecution};
use crate::domain::payload::{PromptPayload, RESERVED_TOOLS, Variables, extract_payload};

impl CompiledTemplate {
    /// Render the template for `payload`.
    pub fn format<P: PromptPayload>(&self, payload: &P) -> Result<PromptExecution, PromptError> {
        self.format_with_cancel(payload, &CancellationToken::new())
    }

    /// Render the template for `payload`, checking `cancel` before each message.
    pub fn format_with_cancel<P: PromptPayload>(
        &self,
        payload: &P,
        cancel: &CancellationToken,
    ) -> Result<PromptExecution, PromptError> {
        let extracted = extract_payload(&self.schema_cache, Some(payload))?;
        self.render_variables(extracted.variables, &extracted.history, cancel)
    }

    /// Render from an already-built variable map.
    ///
    /// `history` is spliced after the leading system/developer messages and
    /// is never modified.
    pub fn render_variables(
        &self,
        variables: Variables,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<PromptExecution, PromptError> {
        let merged = self.merge(variables);
        self.check_required(&merged)?;

        let mut rendered = Vec::with_capacity(self.messages.len() + history.len());
        for (index, message) in self.messages.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(template = %self.metadata.id, index, "render cancelled");
                return Err(PromptError::Cancelled);
            }
            if message.optional && all_zero(&merged, &message.dependent_variables) {
                trace!(template = %self.metadata.id, index, "skipping optional message");
                continue;
            }
            let text = self.execute(index, message, &merged)?;
            rendered.push(ChatMessage {
                role: message.role,
                content: vec![ContentPart::text(text)],
                metadata: message.metadata.clone(),
            });
        }

        Ok(PromptExecution::new(
            splice_history(rendered, history),
            self.tools.clone(),
            self.model_config.clone(),
            self.metadata.clone(),
            self.response_format.clone(),
        ))
    }

    /// Dry run: merge, check required names, then execute every message,
    /// optional ones included, discarding the output.
    pub fn validate_variables(&self, variables: Variables) -> Result<(), PromptError> {
        let merged = self.merge(variables);
        self.check_required(&merged)?;
        for (index, message) in self.messages.iter().enumerate() {
            self.execute(index, message, &merged)?;
        }
        Ok(())
    }

    /// Defaults, overridden by `variables`, plus the template's tools.
    fn merge(&self, variables: Variables) -> Variables {
        let mut merged = self.default_variables.clone();
        merged.extend(variables);
        merged.insert(RESERVED_TOOLS.to_string(), Value::from_serialize(&self.tools));
        merged
    }

    fn check_required(&self, merged: &Variables) -> Result<(), PromptError> {
        match self.required_variables().into_iter().find(|name| !merged.contains_key(name)) {
            Some(variable) => Err(PromptError::MissingVariable {
                variable,
                template: self.metadata.id.clone(),
            }),
            None => Ok(()),
        }
    }

    fn execute(
        &self,
        index: usize,
        message: &CompiledMessage,
        merged: &Variables,
    ) -> Result<String, PromptError> {
        self.env
            .get_template(&message.name)
            .and_then(|template| template.render(merged))
            .map_err(|source| PromptError::TemplateRender { index, role: message.role, source })
    }
}

/// Whether a value counts as empty for optional-message elision.
///
/// Undefined and none are zero; so are `false`, `0`, empty strings, empty
/// bytes, and empty lists. A map is zero when every entry is zero, so a
/// serialized struct left at its defaults is zero too. Objects, callables,
/// and iterators are always present.
pub fn is_zero(value: &Value) -> bool {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => true,
        ValueKind::Bool
        | ValueKind::Number
        | ValueKind::String
        | ValueKind::Bytes
        | ValueKind::Seq => !value.is_true(),
        ValueKind::Map => match value.try_iter() {
            Ok(mut keys) => {
                keys.all(|key| value.get_item(&key).is_ok_and(|entry| is_zero(&entry)))
            }
            Err(_) => !value.is_true(),
        },
        _ => false,
    }
}

fn all_zero(merged: &Variables, names: &[String]) -> bool {
    names.iter().all(|name| merged.get(name).is_none_or(is_zero))
}

fn splice_history(mut rendered: Vec<ChatMessage>, history: &[ChatMessage]) -> Vec<ChatMessage> {
    if history.is_empty() {
        return rendered;
    }
    let at = rendered.iter().position(|m| !m.role.is_instruction()).unwrap_or(rendered.len());
    let tail = rendered.split_off(at);
    rendered.extend_from_slice(history);
    rendered.extend(tail);
    rendered
}

//! API facade for the `prompty` binary.
//!
//! Glues configuration, the file registry, and the renderer together so the
//! CLI layer only parses flags and prints results.

use std::fs;
use std::path::Path;

use minijinja::Value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use crate::adapters::FileRegistry;
use crate::app::config::CliConfig;
use crate::domain::{
    CharFallbackCounter, ChatMessage, PromptError, PromptExecution, Role, Variables,
};
use crate::ports::TemplateRegistry;

/// Variables and history supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct RenderInput {
    pub variables: Variables,
    pub history: Vec<ChatMessage>,
}

/// One row of `prompty list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    pub id: String,
    /// Empty for manifests only reachable through a subdirectory.
    pub version: String,
}

/// Result of `prompty check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub id: String,
    pub messages: Vec<Role>,
    pub required: Vec<String>,
    /// Whether a dry run against supplied variables was performed.
    pub validated: bool,
}

#[derive(Debug, Deserialize)]
struct WrappedInput {
    #[serde(default)]
    variables: Map<String, JsonValue>,
    #[serde(default)]
    history: Vec<ChatMessage>,
}

/// Build the file registry described by `config`.
pub fn open_registry(config: &CliConfig) -> FileRegistry {
    let mut registry = FileRegistry::new(&config.prompts_dir)
        .with_token_counter(CharFallbackCounter::new(config.chars_per_token));
    if let Some(pattern) = &config.partials {
        registry = registry.with_partials(pattern.clone());
    }
    registry
}

/// Read a JSON or YAML variables file.
///
/// Accepts `{variables: {...}, history: [...]}` or a flat variable map.
pub fn load_render_input(path: &Path) -> Result<RenderInput, PromptError> {
    let content = fs::read_to_string(path)?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let document: Result<JsonValue, String> = if is_json {
        serde_json::from_str(&content).map_err(|err| err.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|err| err.to_string())
    };
    document
        .and_then(parse_render_input)
        .map_err(|err| PromptError::config_error(format!("{}: {}", path.display(), err)))
}

fn parse_render_input(document: JsonValue) -> Result<RenderInput, String> {
    let JsonValue::Object(map) = document else {
        return Err("expected a mapping of variables".to_string());
    };

    let wrapped = map.contains_key("variables") || map.contains_key("history");
    let (variables, history) = if wrapped {
        let input: WrappedInput =
            serde_json::from_value(JsonValue::Object(map)).map_err(|err| err.to_string())?;
        (input.variables, input.history)
    } else {
        (map, Vec::new())
    };

    let variables = variables.into_iter().map(|(k, v)| (k, Value::from_serialize(v))).collect();
    Ok(RenderInput { variables, history })
}

/// All templates in the registry with their versions.
pub fn list_templates(registry: &dyn TemplateRegistry) -> Result<Vec<TemplateSummary>, PromptError> {
    registry
        .list()?
        .into_iter()
        .map(|id| match registry.stat(&id) {
            Ok(info) => Ok(TemplateSummary { id, version: info.version }),
            Err(PromptError::TemplateNotFound(_)) => Ok(TemplateSummary { id, version: String::new() }),
            Err(err) => Err(err),
        })
        .collect()
}

pub fn render_template(
    registry: &dyn TemplateRegistry,
    id: &str,
    input: RenderInput,
) -> Result<PromptExecution, PromptError> {
    let template = registry.get_template(id)?;
    template.render_variables(input.variables, &input.history, &CancellationToken::new())
}

/// Compile a template and, when variables are given, dry-run it against them.
pub fn check_template(
    registry: &dyn TemplateRegistry,
    id: &str,
    input: Option<RenderInput>,
) -> Result<CheckOutcome, PromptError> {
    let template = registry.get_template(id)?;
    let validated = match input {
        Some(input) => {
            template.validate_variables(input.variables)?;
            true
        }
        None => false,
    };
    Ok(CheckOutcome {
        id: id.to_string(),
        messages: template.compiled_messages().iter().map(|m| m.role()).collect(),
        required: template.required_variables(),
        validated,
    })
}

/// Plain-text rendering: one `[role]` header per message.
pub fn execution_as_text(execution: &PromptExecution) -> String {
    execution
        .messages()
        .iter()
        .map(|message| format!("[{}]\n{}\n", message.role, message.text_content()))
        .collect::<Vec<_>>()
        .join("\n")
}

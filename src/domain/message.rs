//! Chat message model shared by templates, renderer, and registries.
//!
//! `ContentPart` is a closed enum: consumers match it exhaustively and
//! callers cannot introduce new variants.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Passthrough key/value metadata attached to messages.
pub type Metadata = BTreeMap<String, JsonValue>;

/// Message role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    /// Replaces `system` for reasoning-style models.
    Developer,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// System and developer messages form the leading instruction block.
    pub fn is_instruction(&self) -> bool {
        matches!(self, Role::System | Role::Developer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
        /// Provider cache hint, e.g. `ephemeral`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<String>,
    },
    /// Image, audio, video, or document; either `url` or `data` is set.
    Media {
        media_type: String,
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Vec<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<String>,
    },
    /// A model's request to call a tool; `args` is the full JSON argument string.
    ToolCall {
        #[serde(default)]
        id: String,
        name: String,
        args: String,
    },
    ToolResult {
        tool_call_id: String,
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into(), cache_control: None }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text, .. } => Some(text),
            ContentPart::Media { .. } | ContentPart::ToolCall { .. } | ContentPart::ToolResult { .. } => {
                None
            }
        }
    }
}

/// A single chat message with role, content parts, and passthrough metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl ChatMessage {
    /// Create a message holding a single text part.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self { role, content: vec![ContentPart::text(text)], metadata: Metadata::new() }
    }

    /// Concatenated text of all text parts.
    pub fn text_content(&self) -> String {
        self.content.iter().filter_map(ContentPart::as_text).collect()
    }
}

/// Tool definition exposed to templates as `Tools`.
///
/// Field order is the serialization order: name, description, parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, JsonValue>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into(), parameters: Map::new() }
    }

    pub fn with_parameters(mut self, parameters: Map<String, JsonValue>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// JSON Schema describing a structured response format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub schema: Map<String, JsonValue>,
}

/// Observability metadata for a template and its executions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Set by registries that resolve templates per environment.
    #[serde(default)]
    pub environment: String,
}

/// Raw template for one message before compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    pub role: Role,
    /// Template source, e.g. `Hello, {{ user_name }}`.
    pub content: String,
    /// Skip the message when every referenced variable is absent or zero.
    pub optional: bool,
    pub metadata: Metadata,
}

impl MessageTemplate {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), optional: false, metadata: Metadata::new() }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Fully rendered prompt. Owned by the caller and never touched by the engine again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptExecution {
    messages: Vec<ChatMessage>,
    tools: Vec<ToolDefinition>,
    model_config: Metadata,
    metadata: PromptMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<SchemaDefinition>,
}

impl PromptExecution {
    pub(crate) fn new(
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        model_config: Metadata,
        metadata: PromptMetadata,
        response_format: Option<SchemaDefinition>,
    ) -> Self {
        Self { messages, tools, model_config, metadata, response_format }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
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

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_lowercase() {
        let json = serde_json::to_string(&Role::Developer).unwrap();
        assert_eq!(json, "\"developer\"");
        let role: Role = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, Role::Assistant);
    }

    #[test]
    fn only_system_and_developer_are_instructions() {
        assert!(Role::System.is_instruction());
        assert!(Role::Developer.is_instruction());
        assert!(!Role::User.is_instruction());
        assert!(!Role::Assistant.is_instruction());
        assert!(!Role::Tool.is_instruction());
    }

    #[test]
    fn content_parts_are_type_tagged() {
        let part = ContentPart::ToolResult {
            tool_call_id: "call_1".to_string(),
            name: "search".to_string(),
            content: "ok".to_string(),
            is_error: false,
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool_result");

        let text: ContentPart = serde_json::from_str(r#"{"type":"text","text":"hi"}"#).unwrap();
        assert_eq!(text.as_text(), Some("hi"));
    }

    #[test]
    fn text_content_skips_non_text_parts() {
        let message = ChatMessage {
            role: Role::User,
            content: vec![
                ContentPart::text("look at "),
                ContentPart::Media {
                    media_type: "image".to_string(),
                    mime_type: "image/png".to_string(),
                    url: Some("https://example.com/a.png".to_string()),
                    data: None,
                    cache_control: None,
                },
                ContentPart::text("this"),
            ],
            metadata: Metadata::new(),
        };
        assert_eq!(message.text_content(), "look at this");
    }

    #[test]
    fn tool_definition_omits_empty_parameters() {
        let tool = ToolDefinition::new("search", "Search the web");
        let json = serde_json::to_string(&tool).unwrap();
        assert_eq!(json, r#"{"name":"search","description":"Search the web"}"#);
    }
}

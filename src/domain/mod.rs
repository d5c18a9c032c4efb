pub mod error;
pub mod functions;
pub mod identifiers;
pub mod manifest;
pub mod message;
pub mod payload;
pub mod template;
pub mod token;

pub use error::PromptError;
pub use identifiers::validate_id;
pub use manifest::Manifest;
pub use message::{
    ChatMessage, ContentPart, Metadata, MessageTemplate, PromptExecution, PromptMetadata, Role,
    SchemaDefinition, ToolDefinition,
};
pub use payload::{
    ExtractedPayload, PayloadSchema, PromptPayload, SchemaBuilder, SchemaCache, Variables,
    extract_payload,
};
pub use template::{CompiledMessage, CompiledTemplate, TemplateNamespace, TemplateOptions};
pub use token::{CharFallbackCounter, TokenCountError, TokenCounter};

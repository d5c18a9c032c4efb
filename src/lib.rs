//! prompty: compile per-role message templates and render them into chat messages.
//!
//! ```
//! use prompty::{ChatMessage, CompiledTemplate, MessageTemplate, PromptPayload, Role,
//!     SchemaBuilder, TemplateOptions};
//!
//! struct Question {
//!     topic: String,
//!     history: Vec<ChatMessage>,
//! }
//!
//! impl PromptPayload for Question {
//!     fn describe(schema: &mut SchemaBuilder<Self>) {
//!         schema
//!             .field("topic", |q: &Question| q.topic.clone())
//!             .history(|q: &Question| q.history.as_slice());
//!     }
//! }
//!
//! let template = CompiledTemplate::compile(
//!     vec![
//!         MessageTemplate::new(Role::System, "You explain {{ topic }}."),
//!         MessageTemplate::new(Role::User, "Tell me about {{ topic }}."),
//!     ],
//!     TemplateOptions::new(),
//! )?;
//!
//! let question = Question {
//!     topic: "tides".to_string(),
//!     history: vec![ChatMessage::text(Role::User, "Hi")],
//! };
//! let execution = template.format(&question)?;
//! assert_eq!(execution.messages().len(), 3);
//! assert_eq!(execution.messages()[1].text_content(), "Hi");
//! # Ok::<(), prompty::PromptError>(())
//! ```

pub mod adapters;
pub mod app;
pub mod domain;
pub mod ports;

pub use adapters::{EmbeddedOptions, EmbeddedRegistry, FileRegistry};
pub use domain::functions;
pub use domain::manifest::{self, Manifest};
pub use domain::{
    CharFallbackCounter, ChatMessage, CompiledMessage, CompiledTemplate, ContentPart,
    ExtractedPayload, MessageTemplate, Metadata, PayloadSchema, PromptError, PromptExecution,
    PromptMetadata, PromptPayload, Role, SchemaBuilder, SchemaCache, SchemaDefinition,
    TemplateNamespace, TemplateOptions, TokenCountError, TokenCounter, ToolDefinition, Variables,
    extract_payload, validate_id,
};
pub use ports::{TemplateInfo, TemplateRegistry};
pub use tokio_util::sync::CancellationToken;

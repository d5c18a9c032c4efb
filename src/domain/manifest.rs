//! YAML prompt manifests.
//!
//! ```yaml
//! id: support_agent
//! version: "1.2"
//! description: Answers support tickets
//! model_config: { temperature: 0.2 }
//! metadata: { tags: [support] }
//! variables:
//!   required: [customer]
//!   partial: { tone: friendly }
//! tools:
//!   - name: lookup_order
//!     description: Find an order by id
//! messages:
//!   - role: system
//!     content: "You are a {{ tone }} support agent."
//!     cache: true
//!   - role: user
//!     content: "{{ customer }} asks: {{ question }}"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use include_dir::{Dir, DirEntry};
use minijinja::Value;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::error::PromptError;
use super::message::{
    Metadata, MessageTemplate, PromptMetadata, Role, SchemaDefinition, ToolDefinition,
};
use super::template::{CompiledTemplate, TemplateOptions};

/// Wildcards in partial patterns stay within one path segment.
const SEGMENT_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Metadata key set on messages declared with `cache: true`.
pub const CACHE_METADATA_KEY: &str = "anthropic_cache";

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    id: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    model_config: Metadata,
    #[serde(default)]
    metadata: ManifestMetadata,
    #[serde(default)]
    variables: ManifestVariables,
    #[serde(default)]
    tools: Vec<ToolDefinition>,
    #[serde(default)]
    response_format: Option<SchemaDefinition>,
    #[serde(default)]
    messages: Vec<ManifestMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestMetadata {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestVariables {
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    partial: BTreeMap<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
struct ManifestMessage {
    role: Role,
    #[serde(default)]
    content: String,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    cache: bool,
    #[serde(default)]
    metadata: Metadata,
}

/// A parsed manifest, not yet compiled.
#[derive(Debug, Clone)]
pub struct Manifest {
    messages: Vec<MessageTemplate>,
    options: TemplateOptions,
}

impl Manifest {
    /// Parse a manifest document.
    pub fn parse(source: &str) -> Result<Self, PromptError> {
        let doc: ManifestDocument = serde_yaml::from_str(source)
            .map_err(|err| PromptError::invalid_manifest(err.to_string()))?;

        if doc.id.is_empty() {
            return Err(PromptError::invalid_manifest("missing id"));
        }
        if doc.messages.is_empty() {
            return Err(PromptError::invalid_manifest(format!("{}: missing messages", doc.id)));
        }

        let messages = doc
            .messages
            .into_iter()
            .map(|raw| {
                let mut metadata = raw.metadata;
                if raw.cache {
                    metadata.insert(CACHE_METADATA_KEY.to_string(), JsonValue::Bool(true));
                }
                MessageTemplate {
                    role: raw.role,
                    content: raw.content,
                    optional: raw.optional,
                    metadata,
                }
            })
            .collect();

        let defaults =
            doc.variables.partial.into_iter().map(|(k, v)| (k, Value::from_serialize(v))).collect();

        let mut options = TemplateOptions::new()
            .with_metadata(PromptMetadata {
                id: doc.id,
                version: doc.version,
                description: doc.description,
                tags: doc.metadata.tags,
                environment: String::new(),
            })
            .with_required_vars(doc.variables.required)
            .with_default_variables(defaults)
            .with_tools(doc.tools)
            .with_model_config(doc.model_config);
        if let Some(format) = doc.response_format {
            options = options.with_response_format(format);
        }

        Ok(Self { messages, options })
    }

    pub fn id(&self) -> &str {
        &self.options.metadata.id
    }

    pub fn version(&self) -> &str {
        &self.options.metadata.version
    }

    pub fn messages(&self) -> &[MessageTemplate] {
        &self.messages
    }

    /// Fill in a version when the document did not declare one.
    pub fn with_fallback_version(mut self, version: impl Into<String>) -> Self {
        if self.options.metadata.version.is_empty() {
            self.options.set_version(version);
        }
        self
    }

    pub fn with_partials(mut self, partials: Vec<(String, String)>) -> Self {
        for (name, source) in partials {
            self.options = self.options.with_partial(name, source);
        }
        self
    }

    /// Adjust compile options before compiling, e.g. to plug in a token counter.
    pub fn map_options(mut self, f: impl FnOnce(TemplateOptions) -> TemplateOptions) -> Self {
        self.options = f(self.options);
        self
    }

    pub fn compile(self) -> Result<CompiledTemplate, PromptError> {
        CompiledTemplate::compile(self.messages, self.options)
    }
}

/// Parse and compile a manifest document.
pub fn parse_str(source: &str) -> Result<CompiledTemplate, PromptError> {
    Manifest::parse(source)?.compile()
}

/// Read, parse, and compile a manifest file.
///
/// `partials_glob` is resolved relative to the manifest's directory.
pub fn parse_file(
    path: &Path,
    partials_glob: Option<&str>,
) -> Result<CompiledTemplate, PromptError> {
    read_manifest_file(path, partials_glob)?.compile()
}

pub(crate) fn read_manifest_file(
    path: &Path,
    partials_glob: Option<&str>,
) -> Result<Manifest, PromptError> {
    let source = fs::read_to_string(path)?;
    let manifest = Manifest::parse(&source)?;
    match partials_glob {
        Some(pattern) => {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            Ok(manifest.with_partials(load_partials(base, pattern)?))
        }
        None => Ok(manifest),
    }
}

/// Parse and compile a manifest stored in an embedded bundle.
pub fn parse_embedded(
    bundle: &Dir<'_>,
    path: &Path,
    partials_glob: Option<&str>,
) -> Result<CompiledTemplate, PromptError> {
    let source = bundle
        .get_file(path)
        .and_then(|file| file.contents_utf8())
        .ok_or_else(|| PromptError::TemplateNotFound(path.display().to_string()))?;
    let manifest = Manifest::parse(source)?;
    let partials = match partials_glob {
        Some(pattern) => embedded_partials(bundle, pattern)?,
        None => Vec::new(),
    };
    manifest.with_partials(partials).compile()
}

/// Load every file matching `pattern` under `base`, keyed by file name.
pub fn load_partials(base: &Path, pattern: &str) -> Result<Vec<(String, String)>, PromptError> {
    let full = base.join(pattern);
    let full = full.to_string_lossy();
    let paths = glob::glob(&full).map_err(|err| {
        PromptError::invalid_manifest(format!("invalid partials pattern '{}': {}", pattern, err))
    })?;

    let mut partials = Vec::new();
    for entry in paths {
        let path = entry.map_err(|err| PromptError::Io(err.into()))?;
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        debug!(partial = %name, path = %path.display(), "loading partial");
        partials.push((name, fs::read_to_string(&path)?));
    }
    Ok(partials)
}

/// Collect bundle files whose path matches `pattern`, keyed by file name.
pub fn embedded_partials(
    bundle: &Dir<'_>,
    pattern: &str,
) -> Result<Vec<(String, String)>, PromptError> {
    let pattern = Pattern::new(pattern).map_err(|err| {
        PromptError::invalid_manifest(format!("invalid partials pattern '{}': {}", pattern, err))
    })?;
    let mut partials = Vec::new();
    collect_partials(bundle, &pattern, &mut partials);
    partials.sort();
    Ok(partials)
}

fn collect_partials(dir: &Dir<'_>, pattern: &Pattern, out: &mut Vec<(String, String)>) {
    for entry in dir.entries() {
        match entry {
            DirEntry::File(file) => {
                if !pattern.matches_path_with(file.path(), SEGMENT_MATCH) {
                    continue;
                }
                let name = file.path().file_name().map(|n| n.to_string_lossy().into_owned());
                if let (Some(name), Some(content)) = (name, file.contents_utf8()) {
                    out.push((name, content.to_string()));
                }
            }
            DirEntry::Dir(subdir) => collect_partials(subdir, pattern, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::domain::payload::Variables;

    const SUPPORT: &str = r#"
id: support_agent
version: "1.2"
description: Answers support tickets
model_config:
  temperature: 0.2
metadata:
  tags: [support, beta]
variables:
  required: [customer]
  partial:
    tone: friendly
tools:
  - name: lookup_order
    description: Find an order
    parameters:
      type: object
response_format:
  name: answer
  schema:
    type: object
messages:
  - role: system
    content: "You are a {{ tone }} agent."
    cache: true
  - role: user
    content: "{{ customer }}: {{ question }}"
  - role: assistant
    content: "Noted: {{ note }}"
    optional: true
    metadata:
      label: draft
"#;

    #[test]
    fn parses_full_manifest() {
        let template = parse_str(SUPPORT).unwrap();

        let metadata = template.metadata();
        assert_eq!(metadata.id, "support_agent");
        assert_eq!(metadata.version, "1.2");
        assert_eq!(metadata.tags, vec!["support", "beta"]);
        assert_eq!(template.tools()[0].name, "lookup_order");
        assert_eq!(template.model_config()["temperature"], serde_json::json!(0.2));
        assert_eq!(template.response_format().map(|f| f.name.as_str()), Some("answer"));
        assert_eq!(template.required_variables(), vec!["customer", "tone", "question"]);

        let messages = template.compiled_messages();
        assert_eq!(messages[0].metadata()[CACHE_METADATA_KEY], JsonValue::Bool(true));
        assert!(messages[2].is_optional());
        assert_eq!(messages[2].metadata()["label"], serde_json::json!("draft"));
    }

    #[test]
    fn parsed_manifest_renders() {
        let template = parse_str(SUPPORT).unwrap();
        let vars: Variables = [
            ("customer".to_string(), Value::from("Ada")),
            ("question".to_string(), Value::from("where is my order?")),
        ]
        .into_iter()
        .collect();

        let out = template.render_variables(vars, &[], &CancellationToken::new()).unwrap();
        let texts: Vec<String> = out.messages().iter().map(|m| m.text_content()).collect();
        assert_eq!(texts, vec!["You are a friendly agent.", "Ada: where is my order?"]);
    }

    #[test]
    fn rejects_incomplete_documents() {
        for source in [
            "messages: [{role: user, content: hi}]",
            "id: empty",
            "id: x\nmessages: []",
            "id: [unclosed",
            "id: x\nmessages: [{role: narrator, content: hi}]",
        ] {
            let err = parse_str(source).unwrap_err();
            assert!(matches!(err, PromptError::InvalidManifest(_)), "{source}: {err}");
        }
    }

    #[test]
    fn fallback_version_only_fills_gaps() {
        let manifest = Manifest::parse("id: a\nmessages: [{role: user, content: hi}]").unwrap();
        assert_eq!(manifest.with_fallback_version("v0").version(), "v0");

        let manifest = Manifest::parse(SUPPORT).unwrap();
        assert_eq!(manifest.with_fallback_version("v0").version(), "1.2");
    }

    #[test]
    fn partials_are_loaded_relative_to_the_manifest() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("_partials")).unwrap();
        fs::write(dir.path().join("_partials/footer.tmpl"), "-- {{ team }}").unwrap();
        let path = dir.path().join("note.yaml");
        fs::write(
            &path,
            "id: note\nmessages:\n  - role: user\n    content: \"Hi{% include 'footer.tmpl' %}\"\n",
        )
        .unwrap();

        let template = parse_file(&path, Some("_partials/*.tmpl")).unwrap();
        let vars: Variables = [("team".to_string(), Value::from("ops"))].into_iter().collect();
        let out = template.render_variables(vars, &[], &CancellationToken::new()).unwrap();
        assert_eq!(out.messages()[0].text_content(), "Hi-- ops");
    }

    #[test]
    fn embedded_wildcards_do_not_cross_directories() {
        static BUNDLE: Dir = include_dir::include_dir!("$CARGO_MANIFEST_DIR/tests/fixtures");

        assert!(embedded_partials(&BUNDLE, "prompts/*.tmpl").unwrap().is_empty());
        assert!(embedded_partials(&BUNDLE, "*.tmpl").unwrap().is_empty());

        let partials = embedded_partials(&BUNDLE, "prompts/_partials/*.tmpl").unwrap();
        let names: Vec<&str> = partials.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["style.tmpl"]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = parse_file(&dir.path().join("absent.yaml"), None).unwrap_err();
        assert!(matches!(err, PromptError::Io(_)));
    }
}

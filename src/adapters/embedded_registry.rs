use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use include_dir::{Dir, DirEntry};
use tracing::debug;

use super::file_registry::manifest_id;
use crate::domain::manifest::embedded_partials;
use crate::domain::{CompiledTemplate, Manifest, PromptError, TokenCounter, validate_id};
use crate::ports::{TemplateInfo, TemplateRegistry};

/// Settings for [`EmbeddedRegistry::new`].
#[derive(Clone, Default)]
pub struct EmbeddedOptions {
    /// Glob for partial files, relative to the registry root.
    pub partials: Option<String>,
    /// Build or release tag; becomes the version of templates that declare none.
    pub version: Option<String>,
    pub token_counter: Option<Arc<dyn TokenCounter>>,
}

/// Templates compiled up front from a bundle embedded with `include_dir!`.
///
/// Every `.yaml`/`.yml` file below `root` is parsed when the registry is
/// built; a single bad manifest fails construction.
#[derive(Debug)]
pub struct EmbeddedRegistry {
    templates: HashMap<String, Arc<CompiledTemplate>>,
    ids: Vec<String>,
    version: String,
}

impl EmbeddedRegistry {
    pub fn new(bundle: &Dir<'_>, root: &str, options: EmbeddedOptions) -> Result<Self, PromptError> {
        let root_dir = match root.trim_matches('/') {
            "" | "." => bundle,
            path => bundle.get_dir(path).ok_or_else(|| {
                PromptError::config_error(format!("embedded root '{}' not found", root))
            })?,
        };

        let partials = match &options.partials {
            Some(pattern) => {
                let pattern = Path::new(root.trim_matches('/')).join(pattern);
                embedded_partials(bundle, &pattern.to_string_lossy())?
            }
            None => Vec::new(),
        };

        let mut registry = Self {
            templates: HashMap::new(),
            ids: Vec::new(),
            version: options.version.clone().unwrap_or_default(),
        };
        registry.load_dir(root_dir, &partials, &options)?;
        debug!(root, templates = registry.ids.len(), "loaded embedded templates");
        Ok(registry)
    }

    fn load_dir(
        &mut self,
        dir: &Dir<'_>,
        partials: &[(String, String)],
        options: &EmbeddedOptions,
    ) -> Result<(), PromptError> {
        for entry in dir.entries() {
            match entry {
                DirEntry::Dir(subdir) => self.load_dir(subdir, partials, options)?,
                DirEntry::File(file) => {
                    let Some(id) = manifest_id(file.path()) else {
                        continue;
                    };
                    let path = file.path().display().to_string();
                    let source = file.contents_utf8().ok_or_else(|| {
                        PromptError::invalid_manifest(format!("{}: not valid UTF-8", path))
                    })?;
                    let template = compile_embedded(source, partials, options)
                        .map_err(|err| with_path(&path, err))?;

                    if self.templates.insert(id.clone(), Arc::new(template)).is_none() {
                        self.ids.push(id);
                    }
                }
            }
        }
        Ok(())
    }
}

fn compile_embedded(
    source: &str,
    partials: &[(String, String)],
    options: &EmbeddedOptions,
) -> Result<CompiledTemplate, PromptError> {
    let mut manifest = Manifest::parse(source)?.with_partials(partials.to_vec());
    if let Some(version) = &options.version {
        manifest = manifest.with_fallback_version(version.clone());
    }
    if let Some(counter) = &options.token_counter {
        let counter = Arc::clone(counter);
        manifest = manifest.map_options(|o| o.with_shared_token_counter(counter));
    }
    manifest.compile()
}

fn with_path(path: &str, err: PromptError) -> PromptError {
    match err {
        PromptError::InvalidManifest(reason) => {
            PromptError::InvalidManifest(format!("{}: {}", path, reason))
        }
        other => other,
    }
}

impl TemplateRegistry for EmbeddedRegistry {
    fn get_template(&self, id: &str) -> Result<Arc<CompiledTemplate>, PromptError> {
        validate_id(id)?;
        self.templates.get(id).cloned().ok_or_else(|| PromptError::TemplateNotFound(id.to_string()))
    }

    /// Ids in bundle walk order.
    fn list(&self) -> Result<Vec<String>, PromptError> {
        Ok(self.ids.clone())
    }

    fn stat(&self, id: &str) -> Result<TemplateInfo, PromptError> {
        validate_id(id)?;
        if !self.templates.contains_key(id) {
            return Err(PromptError::TemplateNotFound(id.to_string()));
        }
        Ok(TemplateInfo { id: id.to_string(), version: self.version.clone(), updated_at: None })
    }
}

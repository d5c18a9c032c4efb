use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;
use walkdir::WalkDir;

use crate::domain::manifest::read_manifest_file;
use crate::domain::{CompiledTemplate, PromptError, TokenCounter, validate_id};
use crate::ports::{TemplateInfo, TemplateRegistry};

const MANIFEST_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Loads manifests from a directory on first use and caches the result.
///
/// `{dir}/{id}.yaml` is tried before `{dir}/{id}.yml`. Templates without a
/// declared version get the file's modification time.
pub struct FileRegistry {
    dir: PathBuf,
    partials: Option<String>,
    token_counter: Option<Arc<dyn TokenCounter>>,
    cache: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
}

impl FileRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), partials: None, token_counter: None, cache: RwLock::default() }
    }

    /// Glob for partial files, resolved relative to each manifest's directory.
    pub fn with_partials(mut self, pattern: impl Into<String>) -> Self {
        self.partials = Some(pattern.into());
        self
    }

    pub fn with_token_counter(mut self, counter: impl TokenCounter + 'static) -> Self {
        self.token_counter = Some(Arc::new(counter));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Drop every cached template; the next lookup reads from disk again.
    pub fn reload(&self) {
        self.cache.write().unwrap_or_else(PoisonError::into_inner).clear();
        debug!(dir = %self.dir.display(), "cleared template cache");
    }

    fn candidate_paths<'a>(&'a self, id: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        MANIFEST_EXTENSIONS.iter().map(move |ext| self.dir.join(format!("{}.{}", id, ext)))
    }

    /// First existing manifest path for `id` with its modification time.
    fn locate(&self, id: &str) -> Result<(PathBuf, DateTime<Utc>), PromptError> {
        for path in self.candidate_paths(id) {
            match fs::metadata(&path) {
                Ok(meta) => return Ok((path, DateTime::from(meta.modified()?))),
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(PromptError::TemplateNotFound(id.to_string()))
    }

    fn load(&self, id: &str) -> Result<CompiledTemplate, PromptError> {
        let (path, modified) = self.locate(id)?;
        debug!(id, path = %path.display(), "loading manifest");

        let mut manifest = read_manifest_file(&path, self.partials.as_deref())?
            .with_fallback_version(format_version(modified));
        if let Some(counter) = &self.token_counter {
            let counter = Arc::clone(counter);
            manifest = manifest.map_options(|options| options.with_shared_token_counter(counter));
        }
        manifest.compile()
    }
}

impl TemplateRegistry for FileRegistry {
    fn get_template(&self, id: &str) -> Result<Arc<CompiledTemplate>, PromptError> {
        validate_id(id)?;

        let cached = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned();
        if let Some(template) = cached {
            return Ok(template);
        }

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(template) = cache.get(id) {
            return Ok(Arc::clone(template));
        }
        let template = Arc::new(self.load(id)?);
        cache.insert(id.to_string(), Arc::clone(&template));
        Ok(template)
    }

    /// Ids of every `.yaml`/`.yml` file below the directory, sorted.
    fn list(&self) -> Result<Vec<String>, PromptError> {
        let mut ids = BTreeSet::new();
        for entry in WalkDir::new(&self.dir) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(id) = manifest_id(entry.path()) {
                ids.insert(id);
            }
        }
        Ok(ids.into_iter().collect())
    }

    fn stat(&self, id: &str) -> Result<TemplateInfo, PromptError> {
        validate_id(id)?;
        let (_, modified) = self.locate(id)?;
        Ok(TemplateInfo {
            id: id.to_string(),
            version: format_version(modified),
            updated_at: Some(modified),
        })
    }
}

/// File stem of a manifest path, or `None` for other files.
pub(crate) fn manifest_id(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !MANIFEST_EXTENSIONS.contains(&ext) {
        return None;
    }
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
}

fn format_version(modified: DateTime<Utc>) -> String {
    modified.to_rfc3339_opts(SecondsFormat::Secs, true)
}

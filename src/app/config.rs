//! CLI configuration read from `prompty.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::PromptError;

/// Config file looked up in the working directory.
pub const CONFIG_FILE: &str = "prompty.toml";

/// Settings shared by every CLI command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Directory holding the manifests.
    pub prompts_dir: PathBuf,
    /// Glob for partial files, relative to each manifest's directory.
    pub partials: Option<String>,
    /// Characters per token for `truncate_tokens`; 0 uses the default.
    pub chars_per_token: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self { prompts_dir: PathBuf::from("prompts"), partials: None, chars_per_token: 0 }
    }
}

impl CliConfig {
    /// Apply command-line overrides.
    pub fn with_overrides(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.prompts_dir = dir;
        }
        self
    }
}

/// Load `prompty.toml` from `root`, falling back to defaults when absent.
///
/// A relative `prompts_dir` is resolved against `root`.
pub fn load_config(root: &Path) -> Result<CliConfig, PromptError> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    let mut config = parse_config(&content)
        .map_err(|err| PromptError::config_error(format!("{}: {}", path.display(), err)))?;
    if config.prompts_dir.is_relative() {
        config.prompts_dir = root.join(&config.prompts_dir);
    }
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<CliConfig, toml::de::Error> {
    toml::from_str(content)
}

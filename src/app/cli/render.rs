use std::path::PathBuf;

use crate::app::api::{self, RenderInput};
use crate::app::config::CliConfig;
use crate::domain::PromptError;

pub fn run_render(
    config: &CliConfig,
    id: &str,
    vars: Option<PathBuf>,
    text: bool,
) -> Result<(), PromptError> {
    let input = match vars {
        Some(path) => api::load_render_input(&path)?,
        None => RenderInput::default(),
    };
    let registry = api::open_registry(config);
    let execution = api::render_template(&registry, id, input)?;

    if text {
        print!("{}", api::execution_as_text(&execution));
    } else {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    }
    Ok(())
}

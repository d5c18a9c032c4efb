use std::path::PathBuf;

use crate::app::api;
use crate::app::config::CliConfig;
use crate::domain::PromptError;

pub fn run_check(config: &CliConfig, id: &str, vars: Option<PathBuf>) -> Result<(), PromptError> {
    let input = vars.map(|path| api::load_render_input(&path)).transpose()?;
    let registry = api::open_registry(config);
    let outcome = api::check_template(&registry, id, input)?;

    let roles: Vec<&str> = outcome.messages.iter().map(|role| role.as_str()).collect();
    println!("✅ {} compiled ({} message(s): {})", outcome.id, roles.len(), roles.join(", "));
    if outcome.required.is_empty() {
        println!("  No required variables");
    } else {
        println!("  Required variables: {}", outcome.required.join(", "));
    }
    if outcome.validated {
        println!("  Variables validated");
    }
    Ok(())
}

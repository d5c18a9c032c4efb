use crate::app::api;
use crate::app::config::CliConfig;
use crate::domain::PromptError;

pub fn run_list(config: &CliConfig) -> Result<(), PromptError> {
    let registry = api::open_registry(config);
    let templates = api::list_templates(&registry)?;

    if templates.is_empty() {
        println!("No templates found in {}", config.prompts_dir.display());
        return Ok(());
    }
    for template in templates {
        if template.version.is_empty() {
            println!("{}", template.id);
        } else {
            println!("{}\t{}", template.id, template.version);
        }
    }
    Ok(())
}

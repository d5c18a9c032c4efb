//! CLI Adapter.

mod check;
mod list;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::app::config::{CliConfig, load_config};
use crate::domain::PromptError;

#[derive(Parser)]
#[command(name = "prompty")]
#[command(version)]
#[command(about = "Compile and render chat prompt manifests", long_about = None)]
struct Cli {
    /// Directory holding the manifests (overrides prompts_dir in prompty.toml)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Log engine diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available templates
    #[clap(visible_alias = "ls")]
    List,
    /// Render a template to chat messages
    #[clap(visible_alias = "r")]
    Render {
        /// Template id
        id: String,
        /// JSON or YAML file with variables (and optional history)
        #[arg(long)]
        vars: Option<PathBuf>,
        /// Print plain text instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// Compile a template and optionally dry-run it against variables
    #[clap(visible_alias = "c")]
    Check {
        /// Template id
        id: String,
        /// JSON or YAML file with variables
        #[arg(long)]
        vars: Option<PathBuf>,
    },
}

/// Entry point for the CLI.
pub fn run() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_cli_config(cli.dir).and_then(|config| match cli.command {
        Commands::List => list::run_list(&config),
        Commands::Render { id, vars, text } => render::run_render(&config, &id, vars, text),
        Commands::Check { id, vars } => check::run_check(&config, &id, vars),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_cli_config(dir: Option<PathBuf>) -> Result<CliConfig, PromptError> {
    let cwd = std::env::current_dir()?;
    Ok(load_config(&cwd)?.with_overrides(dir))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "prompty=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Ignore the error when a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

//! Projects command implementation.

use crate::error::CliError;
use depot_server::ServerConfig;
use std::path::Path;

/// Runs the projects command.
///
/// Tokens are never printed, only how many each project has.
pub fn run(config_path: &Path) -> Result<(), CliError> {
    let config = ServerConfig::load(config_path)?;
    print!("{}", render(&config));
    Ok(())
}

fn render(config: &ServerConfig) -> String {
    let mut out = format!("Data directory: {}\n", config.data_dir.display());
    if config.projects.is_empty() {
        out.push_str("No projects configured.\n");
    }
    for project in &config.projects {
        out.push_str(&format!(
            "  {} ({} token{})\n",
            project.name,
            project.access_tokens.len(),
            if project.access_tokens.len() == 1 { "" } else { "s" }
        ));
    }
    out
}

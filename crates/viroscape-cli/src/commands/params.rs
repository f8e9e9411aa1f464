//! Print the effective configuration.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::config::Config;

pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    match &config.source {
        Some(path) => eprintln!("{} {}", "# loaded from".dimmed(), path.display()),
        None => eprintln!("{}", "# no config file found, using defaults".dimmed()),
    }
    print!("{}", config.to_toml()?);

    if let Err(e) = config.params.validate() {
        eprintln!("{} {}", "warning:".yellow().bold(), e);
    }
    Ok(())
}

//! Configuration management for the Viroscape CLI.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use viroscape_core::SimulationParameters;

pub const CONFIG_FILE: &str = "viroscape.toml";

/// Simulation parameters and the file they came from.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub params: SimulationParameters,
    /// `None` when no file was found and the defaults are in use.
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load `explicit` if given, otherwise viroscape.toml in the current or
    /// parent directories, otherwise the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => find_config_file(),
        };

        match path {
            Some(path) => Ok(Self {
                params: Self::read(&path)?,
                source: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    fn read(path: &Path) -> Result<SimulationParameters> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save the parameters to the specified path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.params).context("Failed to serialize config")
    }

    /// Generate default config as TOML string.
    pub fn default_toml() -> Result<String> {
        Config::default().to_toml()
    }
}

/// Find viroscape.toml in current or parent directories.
fn find_config_file() -> Option<PathBuf> {
    find_config_file_from(std::env::current_dir().ok()?)
}

fn find_config_file_from(mut dir: PathBuf) -> Option<PathBuf> {
    loop {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

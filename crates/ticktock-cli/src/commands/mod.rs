pub mod align;
pub mod classify;
pub mod config;
pub mod register;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use ticktock_core::pipeline::{RegistrationConfig, Strategy};

#[derive(Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Auto,
    Sparse,
    Dense,
    Template,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => Strategy::Auto,
            StrategyArg::Sparse => Strategy::Sparse,
            StrategyArg::Dense => Strategy::Dense,
            StrategyArg::Template => Strategy::TemplateOnly,
        }
    }
}

/// Load a TOML config, or the defaults when no path is given.
pub fn load_config(path: Option<&PathBuf>) -> Result<RegistrationConfig> {
    let config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Invalid registration config {}", path.display()))?
        }
        None => RegistrationConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

use anyhow::{Context, Result};
use lagrange_core::pipelines::coupled::CoupledConfig;
use lagrange_core::pipelines::derivation::DerivationConfig;
use lagrange_core::pipelines::pendulum::PendulumConfig;
use lagrange_core::pipelines::stability::StabilityConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "lagrange.toml";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub output: OutputConfig,
    pub derivation: DerivationConfig,
    pub stability: StabilityConfig,
    pub pendulum: PendulumConfig,
    pub coupled: CoupledConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub plots: bool,
    pub phase_portrait_size: (u32, u32),
    pub pendulum_size: (u32, u32),
    pub two_masses_size: (u32, u32),
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            plots: true,
            phase_portrait_size: (1000, 800),
            pendulum_size: (1000, 600),
            two_masses_size: (1000, 800),
        }
    }
}

impl AppConfig {
    /// Loads an explicitly requested file. Missing or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load configuration from a file, falling back to defaults if the file doesn't exist
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to parse config file {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("Config file {} not found. Using defaults.", path.display());
                Self::default()
            }
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

//! Command line interface for lagrange

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{AppConfig, DEFAULT_CONFIG_FILE};

/// lagrange - symbolic derivation and simulation of simple mechanical systems
#[derive(Parser, Debug)]
#[command(name = "lagrange", version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for generated plots (overrides config file)
    #[arg(short, long, value_name = "DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Skip writing PNG files
    #[arg(long, global = true)]
    pub no_plot: bool,

    /// Write the serialized report to FILE
    #[arg(long, value_name = "FILE", global = true)]
    pub json: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Derive the pendulum equation of motion from its Lagrangian
    Derive,
    /// Equilibria, eigenvalues and phase portrait of the configured field
    Stability,
    /// Closed-form response of the linearized pendulum
    Pendulum,
    /// Closed-form response of two masses coupled by three springs
    Coupled,
    /// Run every pipeline in turn
    All,
    /// Print the effective configuration as TOML
    Config,
}

/// Loads configuration from file or defaults, then applies command-line overrides
pub fn load_and_apply_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            AppConfig::load(path)?
        }
        None => AppConfig::load_or_default(Path::new(DEFAULT_CONFIG_FILE)),
    };

    if let Some(dir) = &args.output_dir {
        info!("Overriding output directory to: {}", dir.display());
        config.output.directory = dir.clone();
    }
    if args.no_plot {
        config.output.plots = false;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let args = Args::try_parse_from(["lagrange", "pendulum", "--no-plot", "-o", "out"]).unwrap();
        assert_eq!(args.command, Command::Pendulum);
        assert!(args.no_plot);

        let config = load_and_apply_config(&args).unwrap();
        assert!(!config.output.plots);
        assert_eq!(config.output.directory, PathBuf::from("out"));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Args::try_parse_from(["lagrange"]).is_err());
        assert!(Args::try_parse_from(["lagrange", "orbit"]).is_err());
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let args = Args::try_parse_from([
            "lagrange",
            "derive",
            "--config",
            "/nonexistent/lagrange-config.toml",
        ])
        .unwrap();
        assert!(load_and_apply_config(&args).is_err());
    }
}

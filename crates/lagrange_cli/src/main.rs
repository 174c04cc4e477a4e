mod cli;
mod config;
mod plot;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use lagrange_core::pipelines::{coupled, derivation, pendulum, stability};
use std::io::Write;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};
use crate::config::AppConfig;
use crate::report::RunReport;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let config = cli::load_and_apply_config(&args)?;
    debug!(?config, "effective configuration");

    if args.command == Command::Config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if config.output.plots {
        std::fs::create_dir_all(&config.output.directory).with_context(|| {
            format!(
                "Failed to create output directory {}",
                config.output.directory.display()
            )
        })?;
    }

    let report = run(args.command, &config)?;

    if let Some(path) = &args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

fn run(command: Command, config: &AppConfig) -> Result<RunReport> {
    let all = command == Command::All;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut report = RunReport::default();

    if all || command == Command::Derive {
        let result = derivation::run(&config.derivation).context("Derivation pipeline failed")?;
        report::print_derivation(&mut out, &result)?;
        report.derivation = Some(result);
    }

    if all || command == Command::Stability {
        let analysis = stability::analyze(&config.stability).context("Stability pipeline failed")?;
        let result = analysis.report();
        report::print_stability(&mut out, &result)?;
        if config.output.plots {
            let path = config.output.directory.join("phase_portrait.png");
            plot::phase_portrait(&path, &analysis, config.output.phase_portrait_size)?;
        }
        report.stability = Some(result);
    }

    if all || command == Command::Pendulum {
        let result = pendulum::run(&config.pendulum).context("Pendulum pipeline failed")?;
        report::print_pendulum(&mut out, &result)?;
        if config.output.plots {
            let path = config.output.directory.join("pendulum.png");
            plot::pendulum(&path, &result.series, config.output.pendulum_size)?;
        }
        report.pendulum = Some(result);
    }

    if all || command == Command::Coupled {
        let result = coupled::run(&config.coupled).context("Coupled-mass pipeline failed")?;
        report::print_coupled(&mut out, &result)?;
        if config.output.plots {
            let path = config.output.directory.join("two_masses.png");
            plot::two_masses(&path, &result.series, config.output.two_masses_size)?;
        }
        report.coupled = Some(result);
    }

    out.flush()?;
    Ok(report)
}

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use craftie_cli::commands::{start, sync};
use craftie_cli::{Cli, Commands, Config};

fn load_config(cli: &Cli) -> Result<Config> {
    let config =
        Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // Logs go to stderr so progress lines on stdout stay clean.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Start {
            project,
            notes,
            task,
            duration,
        }) => {
            let config = load_config(&cli)?;
            let args = start::StartArgs {
                project: project.clone(),
                task: task.clone(),
                notes: notes.clone(),
                duration: duration.clone(),
            };
            start::run(&mut io::stdout().lock(), &config, &args)?;
        }
        Some(Commands::Sync) => {
            let config = load_config(&cli)?;
            sync::run(&mut io::stdout().lock(), &config)?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}

//! Crushwave CLI - Bit-Crush and Export
//!
//! Command-line interface for the Crushwave engine.

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use crushwave::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Crushwave v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Crushwave v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Crush {
            input,
            output,
            bits,
            hold,
            format,
            config,
        } => {
            commands::crush(
                &input,
                output.as_deref(),
                bits,
                hold,
                format.as_deref(),
                config.as_deref(),
            )
            .with_context(|| format!("Failed to crush {}", input.display()))?;
        }
        Commands::Inspect { path } => {
            commands::inspect(&path).with_context(|| format!("Failed to inspect {}", path.display()))?;
        }
        Commands::Tone {
            output,
            freq,
            secs,
            rate,
        } => {
            commands::tone(&output, freq, secs, rate)
                .with_context(|| format!("Failed to write tone to {}", output.display()))?;
        }
    }
    Ok(())
}

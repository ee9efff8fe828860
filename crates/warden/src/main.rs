// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Warden - a security-hardened personal AI-agent gateway.
//!
//! Binary entry point. Exit codes: 0 normal shutdown, 1 fatal init
//! (missing env, invalid config, cannot bind socket, cannot reach the
//! container runtime).

use warden::{doctor, serve};

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use warden_config::{load_config, load_config_from_path, validate_config};

/// Warden - a security-hardened personal AI-agent gateway.
#[derive(Parser, Debug)]
#[command(name = "warden", version, about, long_about = None)]
struct Cli {
    /// Path to a warden.toml (default: XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway.
    Serve,
    /// Run preflight checks and print a report.
    Doctor,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load configuration: {e}");
            return ExitCode::from(1);
        }
    };

    match cli.command {
        Commands::Serve => {
            if let Err(errors) = validate_config(&config) {
                for e in errors {
                    eprintln!("error: {e}");
                }
                return ExitCode::from(1);
            }
            match serve::run_serve(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::from(1)
                }
            }
        }
        Commands::Doctor => {
            if doctor::run_doctor(&config).await {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
    }
}

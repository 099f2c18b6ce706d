//! hotview - isolated hot-reload previews for UI source files.

#![allow(dead_code)]

mod builder;
mod cli;
mod config;
mod control;
mod core;
mod isolate;
mod logger;
mod session;
mod surface;
mod utils;
mod watch;

use std::time::Duration;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    match &cli.command {
        Commands::Watch { source } => {
            runtime.block_on(cli::watch::watch_source(source, cli.session_options()))
        }
        Commands::Check { source, timeout } => {
            let rendered = runtime.block_on(cli::check::check_source(
                source,
                cli.session_options(),
                Duration::from_secs(*timeout),
            ))?;
            if !rendered {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
